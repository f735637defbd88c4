//! RFC 5231: `:count` and `:value` match types. They join the existing
//! `@match-type` group, so every test with a MATCH-TYPE slot picks them up.

use crate::error::RegistryError;
use crate::grammar::*;
use crate::registry::RegistryBuilder;

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    b.register_tag(
        id("match-type/value", "@match-type", "relational"),
        token(":value"),
        vec![string_field("relation").default("eq")],
    )?;
    b.register_tag(
        id("match-type/count", "@match-type", "relational"),
        token(":count"),
        vec![string_field("relation").default("eq")],
    )
}
