//! RFC 5429: `reject` and `ereject`.

use crate::error::RegistryError;
use crate::grammar::*;
use crate::registry::RegistryBuilder;

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    b.register_action(
        id("action/reject", ACTIONS, "reject"),
        token("reject"),
        vec![],
        vec![string_field("reason")],
    )?;

    b.register_action(
        id("action/ereject", ACTIONS, "ereject"),
        token("ereject"),
        vec![],
        vec![string_field("reason")],
    )
}
