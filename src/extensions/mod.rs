//! Bundled vocabulary. Each module is a pure data provider: it only calls
//! `register_*` / `extend_*` on the builder it is handed.

pub mod core;
pub mod fileinto;
pub mod mailbox;
pub mod reject;
pub mod relational;
pub mod variables;

use crate::registry::Provider;

/// Every bundled provider. `core` must run first and `fileinto` before
/// `mailbox`, which extends it.
pub const ALL: &[Provider] = &[
    core::register,
    fileinto::register,
    reject::register,
    mailbox::register,
    variables::register,
    relational::register,
];
