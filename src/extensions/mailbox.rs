//! RFC 5490: `mailbox`, `mboxmetadata` and `servermetadata`.

use crate::error::RegistryError;
use crate::grammar::*;
use crate::registry::RegistryBuilder;

pub fn register(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
    // fileinto [:create] <mailbox: string>
    b.register_tag(
        id("action/fileinto/create", "@action/fileinto/", "mailbox"),
        token(":create"),
        vec![],
    )?;
    b.extend_action(
        "action/fileinto",
        tag("create").accepts("action/fileinto/create"),
    )?;

    // mailboxexists <mailbox-names: string-list>
    b.register_test(
        id("test/mailboxexists", TESTS, "mailbox"),
        token("mailboxexists"),
        vec![],
        vec![string_list_field("mailboxes").default("INBOX")],
    )?;

    // metadataexists <mailbox: string> <annotation-names: string-list>
    b.register_test(
        id("test/metadataexists", TESTS, "mboxmetadata"),
        token("metadataexists"),
        vec![],
        vec![
            string_field("mailbox").default("INBOX"),
            string_list_field("annotations"),
        ],
    )?;

    // metadata [MATCH-TYPE] [COMPARATOR] <mailbox: string>
    //          <annotation-name: string> <key-list: string-list>
    b.register_test(
        id("test/metadata", TESTS, "mboxmetadata"),
        token("metadata"),
        vec![
            tag("match-type").default("match-type/is"),
            tag("comparator").default("comparator"),
        ],
        vec![
            string_field("mailbox").default("INBOX"),
            string_field("annotation"),
            string_list_field("keys"),
        ],
    )?;

    // servermetadataexists <annotation-names: string-list>
    b.register_test(
        id("test/servermetadataexists", TESTS, "servermetadata"),
        token("servermetadataexists"),
        vec![],
        vec![string_list_field("annotations")],
    )?;

    // servermetadata [MATCH-TYPE] [COMPARATOR] <annotation-name: string> <key-list: string-list>
    b.register_test(
        id("test/servermetadata", TESTS, "servermetadata"),
        token("servermetadata"),
        vec![
            tag("match-type").default("match-type/is"),
            tag("comparator").default("comparator"),
        ],
        vec![string_field("annotation"), string_list_field("keys")],
    )
}
