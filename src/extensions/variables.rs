//! RFC 5229: `set` and the `string` test.
//!
//! Each modifier precedence class gets its own tag slot (`modifier/10` ..
//! `modifier/40`), so at most one modifier per class can be given.

use crate::error::RegistryError;
use crate::grammar::*;
use crate::registry::RegistryBuilder;

const MODIFIERS: &[(&str, &[&str])] = &[
    ("modifier/10", &["length"]),
    ("modifier/20", &["quotewildcard"]),
    ("modifier/30", &["lowerfirst", "upperfirst"]),
    ("modifier/40", &["lower", "upper"]),
];

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    let mut slots = Vec::new();
    for (group, names) in MODIFIERS {
        let parent = format!("@{}", group);
        for name in *names {
            b.register_tag(
                id(&format!("{}/{}", group, name), &parent, "variables"),
                format!(":{}", name),
                vec![],
            )?;
        }
        slots.push(tag(group));
    }

    // set [MODIFIER] <name: string> <value: string>
    b.register_action(
        id("action/set", ACTIONS, "variables"),
        token("set"),
        slots,
        vec![string_field("name").default("variable"), string_field("value")],
    )?;

    // string [MATCH-TYPE] [COMPARATOR] <source: string-list> <key-list: string-list>
    b.register_test(
        id("test/string", TESTS, "variables"),
        token("string"),
        vec![
            tag("match-type").default("match-type/is"),
            tag("comparator").default("comparator"),
        ],
        vec![string_list_field("source"), string_list_field("keys")],
    )
}
