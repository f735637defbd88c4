//! RFC 5228 base language, including the optional `envelope` test.

use crate::error::RegistryError;
use crate::grammar::*;
use crate::registry::RegistryBuilder;

pub const REQUIRE: &str = "control/require";
pub const IF: &str = "control/if";
pub const ELSIF: &str = "control/elsif";
pub const ELSE: &str = "control/else";

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    register_tags(b)?;
    register_controls(b)?;
    register_actions(b)?;
    register_tests(b)
}

fn register_tags(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    // MATCH-TYPE
    b.register_tag(id("match-type/is", "@match-type", None), token(":is"), vec![])?;
    b.register_tag(
        id("match-type/contains", "@match-type", None),
        token(":contains"),
        vec![],
    )?;
    b.register_tag(
        id("match-type/matches", "@match-type", None),
        token(":matches"),
        vec![],
    )?;

    // COMPARATOR
    b.register_tag(
        id("comparator", "@comparator", None),
        token(":comparator"),
        vec![string_field("comparator").default("i;ascii-casemap")],
    )?;

    // ADDRESS-PART
    b.register_tag(
        id("address-part/all", "@address-part", None),
        token(":all"),
        vec![],
    )?;
    b.register_tag(
        id("address-part/localpart", "@address-part", None),
        token(":localpart"),
        vec![],
    )?;
    b.register_tag(
        id("address-part/domain", "@address-part", None),
        token(":domain"),
        vec![],
    )?;

    // size :over / :under
    b.register_tag(id("size-type/over", "@size-type", None), token(":over"), vec![])?;
    b.register_tag(id("size-type/under", "@size-type", None), token(":under"), vec![])
}

fn register_controls(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    // require <capabilities: string-list>
    b.register_control(
        id(REQUIRE, CONTROLS, None),
        token("require"),
        vec![],
        vec![string_list_field("capabilities")],
    )?;

    b.register_control(
        id(IF, CONTROLS, None),
        token("if"),
        vec![],
        vec![test_field("test"), block_field("block")],
    )?;

    b.register(
        Definition::new(
            id(ELSIF, CONTROLS, None),
            token("elsif"),
            vec![],
            vec![test_field("test"), block_field("block")],
        )
        .following(&[IF, ELSIF]),
    )?;

    b.register(
        Definition::new(
            id(ELSE, CONTROLS, None),
            token("else"),
            vec![],
            vec![block_field("block")],
        )
        .following(&[IF, ELSIF]),
    )?;

    b.register_control(id("control/stop", CONTROLS, None), token("stop"), vec![], vec![])
}

fn register_actions(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    b.register_action(id("action/keep", ACTIONS, None), token("keep"), vec![], vec![])?;
    b.register_action(
        id("action/discard", ACTIONS, None),
        token("discard"),
        vec![],
        vec![],
    )?;

    // redirect <address: string>
    b.register_action(
        id("action/redirect", ACTIONS, None),
        token("redirect"),
        vec![],
        vec![string_field("address")],
    )
}

fn register_tests(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    b.register_test(id("test/true", TESTS, None), token("true"), vec![], vec![])?;
    b.register_test(id("test/false", TESTS, None), token("false"), vec![], vec![])?;

    b.register_test(
        id("test/not", TESTS, None),
        token("not"),
        vec![],
        vec![test_field("test")],
    )?;
    b.register_test(
        id("test/allof", TESTS, None),
        token("allof"),
        vec![],
        vec![test_list_field("tests")],
    )?;
    b.register_test(
        id("test/anyof", TESTS, None),
        token("anyof"),
        vec![],
        vec![test_list_field("tests")],
    )?;

    // exists <header-names: string-list>
    b.register_test(
        id("test/exists", TESTS, None),
        token("exists"),
        vec![],
        vec![string_list_field("headers").default("From")],
    )?;

    // header [COMPARATOR] [MATCH-TYPE] <header-names: string-list> <key-list: string-list>
    b.register_test(
        id("test/header", TESTS, None),
        token("header"),
        vec![
            tag("match-type").default("match-type/is"),
            tag("comparator").default("comparator"),
        ],
        vec![
            string_list_field("headers").default("Subject"),
            string_list_field("keys"),
        ],
    )?;

    // address [COMPARATOR] [ADDRESS-PART] [MATCH-TYPE] <header-list> <key-list>
    b.register_test(
        id("test/address", TESTS, None),
        token("address"),
        vec![
            tag("address-part").default("address-part/all"),
            tag("match-type").default("match-type/is"),
            tag("comparator").default("comparator"),
        ],
        vec![
            string_list_field("headers").default("To"),
            string_list_field("keys"),
        ],
    )?;

    // envelope [COMPARATOR] [ADDRESS-PART] [MATCH-TYPE] <envelope-part> <key-list>
    b.register_test(
        id("test/envelope", TESTS, "envelope"),
        token("envelope"),
        vec![
            tag("address-part").default("address-part/all"),
            tag("match-type").default("match-type/is"),
            tag("comparator").default("comparator"),
        ],
        vec![
            string_list_field("envelope").default("From"),
            string_list_field("keys"),
        ],
    )?;

    // size <":over" / ":under"> <limit: number>
    b.register_test(
        id("test/size", TESTS, None),
        token("size"),
        vec![tag("size-type").default("size-type/over")],
        vec![number_field("limit")],
    )
}
