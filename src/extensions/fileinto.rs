//! RFC 5228 `fileinto`, gated on its own capability.

use crate::error::RegistryError;
use crate::grammar::*;
use crate::registry::RegistryBuilder;

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    // fileinto <mailbox: string>
    b.register_action(
        id("action/fileinto", ACTIONS, "fileinto"),
        token("fileinto"),
        vec![],
        vec![string_field("mailbox").default("INBOX")],
    )
}
