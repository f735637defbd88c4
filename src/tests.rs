use crate::document::{Comment, Document, ElementValue, Node};
use crate::error::{DocumentError, ParseErrorKind, RegistryError, SerializeError};
use crate::extensions::{core, fileinto, reject};
use crate::field::{FieldValue, Number, Quantifier};
use crate::grammar::*;
use crate::parser::{parse, parse_test};
use crate::registry::{Capabilities, Registry, RegistryBuilder};
use crate::serializer::serialize;

// ── Shared fixture runners ──────────────────────────────────────────

const ROUNDTRIP_FIXTURES: &str = include_str!("../test-data/fixtures/roundtrip.json");
const PARSE_ERROR_FIXTURES: &str = include_str!("../test-data/fixtures/parse-errors.json");

fn fixture_capabilities(fixture: &serde_json::Value) -> Capabilities {
    fixture["capabilities"]
        .as_array()
        .map(|caps| caps.iter().filter_map(|c| c.as_str()).collect())
        .unwrap_or_default()
}

fn registry() -> Registry {
    Registry::standard().unwrap()
}

fn caps(names: &[&str]) -> Capabilities {
    names.iter().collect()
}

#[test]
fn test_fixture_roundtrip() {
    let fixtures: Vec<serde_json::Value> = serde_json::from_str(ROUNDTRIP_FIXTURES).unwrap();
    let registry = registry();

    for fixture in &fixtures {
        let name = fixture["name"].as_str().unwrap();
        let input = fixture["input"].as_str().unwrap();
        let expected = fixture["output"].as_str().unwrap();
        let capabilities = fixture_capabilities(fixture);

        let doc = parse(input, &registry, &capabilities)
            .unwrap_or_else(|e| panic!("Fixture '{}': unexpected parse error: {}", name, e));
        let text = serialize(&doc).unwrap();
        assert_eq!(text, expected, "Fixture '{}': canonical text mismatch", name);

        let reparsed = parse(&text, &registry, &capabilities)
            .unwrap_or_else(|e| panic!("Fixture '{}': output does not parse: {}", name, e));
        assert_eq!(reparsed, doc, "Fixture '{}': round trip changed the document", name);
        assert_eq!(
            serialize(&reparsed).unwrap(),
            text,
            "Fixture '{}': serialization is not idempotent",
            name
        );
    }
}

#[test]
fn test_fixture_parse_errors() {
    let fixtures: Vec<serde_json::Value> = serde_json::from_str(PARSE_ERROR_FIXTURES).unwrap();
    let registry = registry();

    for fixture in &fixtures {
        let name = fixture["name"].as_str().unwrap();
        let input = fixture["input"].as_str().unwrap();
        let capabilities = fixture_capabilities(fixture);

        let err = match parse(input, &registry, &capabilities) {
            Ok(doc) => panic!("Fixture '{}': expected an error, got {:?}", name, doc),
            Err(err) => err,
        };
        assert_eq!(
            err.code(),
            fixture["code"].as_str().unwrap(),
            "Fixture '{}': wrong error: {}",
            name,
            err
        );
        assert_eq!(
            err.begin.line as u64,
            fixture["line"].as_u64().unwrap(),
            "Fixture '{}': wrong line",
            name
        );
        assert_eq!(
            err.begin.column as u64,
            fixture["column"].as_u64().unwrap(),
            "Fixture '{}': wrong column",
            name
        );
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[test]
fn test_fileinto_create_enabled() {
    let registry = registry();
    let input = "fileinto :create \"Archive\";";
    let doc = parse(input, &registry, &caps(&["fileinto", "mailbox"])).unwrap();

    assert_eq!(doc.commands().len(), 1);
    let node = &doc.commands()[0];
    assert_eq!(node.kind(), "action/fileinto");
    assert!(node.is_enabled("create").unwrap());
    let create = node.enabled_tag("create").unwrap();
    assert_eq!(create.token(), ":create");
    assert!(create.elements().is_empty());
    assert_eq!(
        node.value("mailbox").unwrap(),
        &FieldValue::String("Archive".into())
    );
    assert_eq!(serialize(&doc).unwrap(), format!("{}\n", input));
}

#[test]
fn test_fileinto_create_disabled() {
    let registry = registry();
    let doc = parse(
        "fileinto \"Archive\";",
        &registry,
        &caps(&["fileinto", "mailbox"]),
    )
    .unwrap();
    let node = &doc.commands()[0];
    assert_eq!(
        node.elements().iter().map(|e| e.name()).collect::<Vec<_>>(),
        vec!["create", "mailbox"]
    );
    assert!(!node.is_enabled("create").unwrap());
    assert!(node.enabled_tag("create").is_none());
    assert_eq!(serialize(&doc).unwrap(), "fileinto \"Archive\";\n");
}

#[test]
fn test_reject_reason() {
    let registry = registry();
    let doc = parse("reject \"Not interested\";", &registry, &caps(&["reject"])).unwrap();
    let node = &doc.commands()[0];
    assert_eq!(node.kind(), "action/reject");
    assert_eq!(node.value("reason").unwrap().as_str(), Some("Not interested"));
}

#[test]
fn test_mailboxexists_list() {
    let registry = registry();
    let node = parse_test(
        "mailboxexists [\"INBOX\", \"Sent\"];",
        &registry,
        &caps(&["mailbox"]),
    )
    .unwrap();
    assert_eq!(node.kind(), "test/mailboxexists");
    assert_eq!(
        node.value("mailboxes").unwrap(),
        &FieldValue::StringList(vec!["INBOX".into(), "Sent".into()])
    );

    let doc = parse(
        "if mailboxexists [\"INBOX\", \"Sent\"] { keep; }",
        &registry,
        &caps(&["mailbox"]),
    )
    .unwrap();
    assert_eq!(doc.commands()[0].test("test"), Some(&node));
}

#[test]
fn test_mailboxexists_without_capability() {
    let registry = registry();
    let err = parse_test("mailboxexists [\"INBOX\"];", &registry, &Capabilities::none())
        .unwrap_err();
    assert_eq!(
        err.kind,
        ParseErrorKind::CapabilityDisabled {
            token: "mailboxexists".into(),
            capability: "mailbox".into()
        }
    );
}

#[test]
fn test_duplicate_reject_registration() {
    let err = Registry::build(&[core::register, reject::register, reject::register]).unwrap_err();
    assert_eq!(
        err,
        RegistryError::DuplicateDefinition {
            kind: "action/reject".into()
        }
    );
}

// ── Capability gating ───────────────────────────────────────────────

#[test]
fn test_capability_gating_is_exact() {
    let registry = registry();
    let script = "if header :count \"ge\" \"To\" \"3\" { discard; }";

    assert!(parse(script, &registry, &caps(&["relational"])).is_ok());
    let err = parse(script, &registry, &caps(&["mailbox", "variables"])).unwrap_err();
    assert_eq!(
        err.kind,
        ParseErrorKind::CapabilityDisabled {
            token: ":count".into(),
            capability: "relational".into()
        }
    );
}

#[test]
fn test_unknown_token_lists_alternatives() {
    let registry = registry();
    let err = parse("kep;", &registry, &Capabilities::none()).unwrap_err();
    match err.kind {
        ParseErrorKind::UnknownToken { token, expected } => {
            assert_eq!(token, "kep");
            assert!(expected.contains(&"keep".to_string()));
            // gated vocabulary is not offered
            assert!(!expected.contains(&"fileinto".to_string()));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_required_and_used_capabilities() {
    let registry = registry();
    let doc = parse(
        "require [\"fileinto\", \"reject\"];\nif true { fileinto :create \"x\"; }",
        &registry,
        &caps(&["fileinto", "mailbox", "reject"]),
    )
    .unwrap();
    assert_eq!(
        doc.required_capabilities().into_iter().collect::<Vec<_>>(),
        vec!["fileinto", "reject"]
    );
    assert_eq!(
        doc.capabilities_used().into_iter().collect::<Vec<_>>(),
        vec!["fileinto", "mailbox"]
    );
}

// ── Extension non-interference ──────────────────────────────────────

#[test]
fn test_extension_does_not_change_unrelated_scripts() {
    let base = Registry::build(&[core::register, fileinto::register, reject::register]).unwrap();
    let extended = registry();
    let capabilities = caps(&["fileinto", "reject", "envelope"]);
    let script = "require \"fileinto\";\n\
                  if anyof (header :matches \"Subject\" \"*sale*\", size :over 1M) {\n\
                  fileinto \"Offers\";\n\
                  } else { reject \"no\"; }";

    let a = parse(script, &base, &capabilities).unwrap();
    let b = parse(script, &extended, &capabilities).unwrap();
    assert_eq!(serialize(&a).unwrap(), serialize(&b).unwrap());

    let fileinto_a = &a.commands()[1].block("block").unwrap().commands[0];
    let fileinto_b = &b.commands()[1].block("block").unwrap().commands[0];
    assert_eq!(fileinto_a.value("mailbox"), fileinto_b.value("mailbox"));
    assert!(fileinto_a.element("create").is_err());
    assert!(!fileinto_b.is_enabled("create").unwrap());
}

#[test]
fn test_extending_with_existing_child_fails_before_parsing() {
    fn clash(b: &mut RegistryBuilder) -> Result<(), RegistryError> {
        b.extend_action("action/fileinto", string_field("mailbox"))
    }
    assert_eq!(
        Registry::build(&[core::register, fileinto::register, clash]).unwrap_err(),
        RegistryError::DuplicateChild {
            kind: "action/fileinto".into(),
            child: "mailbox".into()
        }
    );
}

#[test]
fn test_extension_order_is_enforced() {
    // mailbox extends fileinto, so it must come after it
    let err = Registry::build(&[core::register, crate::extensions::mailbox::register]).unwrap_err();
    assert!(matches!(err, RegistryError::UnknownBase { .. }));
}

// ── Accessor contract ───────────────────────────────────────────────

#[test]
fn test_toggling_a_tag_keeps_its_value() {
    let registry = registry();
    let mut doc = parse(
        "if header :comparator \"i;octet\" \"Subject\" \"x\" { keep; }",
        &registry,
        &Capabilities::none(),
    )
    .unwrap();

    let header = match doc.commands_mut()[0].element_mut("test").unwrap().value_mut() {
        ElementValue::Test(Some(test)) => test,
        other => panic!("unexpected value {:?}", other),
    };
    header.set_enabled("comparator", false).unwrap();
    assert!(header.enabled_tag("comparator").is_none());
    header.set_enabled("comparator", true).unwrap();
    assert_eq!(
        header
            .enabled_tag("comparator")
            .unwrap()
            .value("comparator")
            .unwrap()
            .as_str(),
        Some("i;octet")
    );
}

#[test]
fn test_enabling_a_default_tag() {
    let registry = registry();
    let mut header = registry.instantiate("test/header").unwrap();
    header.set_value("keys", vec!["x".to_string()]).unwrap();
    header.set_enabled("comparator", true).unwrap();

    let mut if_node = registry.instantiate(core::IF).unwrap();
    if_node.set_test("test", header).unwrap();
    let mut doc = Document::new();
    doc.push(if_node);

    assert_eq!(
        serialize(&doc).unwrap(),
        "if header :comparator \"i;ascii-casemap\" \"Subject\" \"x\" {\n}\n"
    );
}

#[test]
fn test_value_types_are_checked() {
    let registry = registry();
    let mut fileinto = registry.instantiate("action/fileinto").unwrap();
    assert_eq!(
        fileinto.set_value("mailbox", vec!["a".to_string(), "b".to_string()]),
        Err(DocumentError::TypeMismatch {
            name: "mailbox".into(),
            expected: "a string".into(),
            found: "a string list".into()
        })
    );
    assert_eq!(
        fileinto.set_enabled("mailbox", false),
        Err(DocumentError::NotATag {
            name: "mailbox".into()
        })
    );
    assert!(matches!(
        fileinto.element("flags"),
        Err(DocumentError::UnknownElement { .. })
    ));
    fileinto.set_value("mailbox", "Lists").unwrap();
    assert_eq!(fileinto.value("mailbox").unwrap().as_str(), Some("Lists"));
}

#[test]
fn test_select_tag_checks_group() {
    let registry = registry();
    let mut set = registry.instantiate("action/set").unwrap();
    set.set_value("value", "Hello").unwrap();

    assert_eq!(
        set.set_enabled("modifier/40", true),
        Err(DocumentError::NoValue {
            name: "modifier/40".into()
        })
    );
    let upper = registry.instantiate("modifier/40/upper").unwrap();
    let err = set.select_tag("modifier/10", upper.clone()).unwrap_err();
    assert!(matches!(err, DocumentError::TagNotAccepted { .. }));
    set.select_tag("modifier/40", upper).unwrap();

    let mut doc = Document::new();
    doc.push(set);
    assert_eq!(
        serialize(&doc).unwrap(),
        "set :upper \"variable\" \"Hello\";\n"
    );
}

#[test]
fn test_size_limit_quantifier() {
    let registry = registry();
    let mut size = registry.instantiate("test/size").unwrap();
    size.set_value("limit", Number::with_quantifier(2, Quantifier::G))
        .unwrap();
    assert_eq!(
        size.value("limit").unwrap().as_number().map(|n| n.absolute()),
        Some(2 * 1024 * 1024 * 1024)
    );
}

// ── Structure ───────────────────────────────────────────────────────

#[test]
fn test_hand_built_node_must_match_definition() {
    let registry = registry();
    let reject = registry.lookup("action/reject").unwrap().clone();
    let node = Node::from_parts(
        reject,
        vec![crate::document::Element::new(
            "reason",
            true,
            ElementValue::Tests(Vec::new()),
        )],
    );
    let mut doc = Document::new();
    doc.push(node);
    assert_eq!(
        serialize(&doc).unwrap_err(),
        SerializeError::StructuralInvariantViolation {
            kind: "action/reject".into(),
            detail: "'reason' holds a test list but a string is declared".into()
        }
    );
}

#[test]
fn test_equality_ignores_positions() {
    let registry = registry();
    let a = parse("keep;", &registry, &Capabilities::none()).unwrap();
    let b = parse("\n\n   keep ;", &registry, &Capabilities::none()).unwrap();
    assert_ne!(a.commands()[0].span(), b.commands()[0].span());
    assert_eq!(a, b);
}

#[test]
fn test_comments_survive_round_trip() {
    let registry = registry();
    let input = "# spam rules\nif anyof (/* cheap */ true,\n# costly\nfalse) {\n  keep; # inline\n}\n";
    let doc = parse(input, &registry, &Capabilities::none()).unwrap();

    let if_node = &doc.commands()[0];
    assert_eq!(if_node.comments(), &[Comment::hash(" spam rules")]);
    let tests = if_node.test("test").unwrap().tests("tests").unwrap();
    assert_eq!(tests[0].comments(), &[Comment::bracket(" cheap ")]);
    assert_eq!(tests[1].comments(), &[Comment::hash(" costly")]);
    assert_eq!(
        if_node.block("block").unwrap().trailing_comments,
        vec![Comment::hash(" inline")]
    );

    let text = serialize(&doc).unwrap();
    assert_eq!(
        text,
        "# spam rules\nif anyof (/* cheap */ true, # costly\n  false) {\n  keep;\n  # inline\n}\n"
    );
    let again = parse(&text, &registry, &Capabilities::none()).unwrap();
    assert_eq!(again, doc);
    assert_eq!(serialize(&again).unwrap(), text);
}

#[test]
fn test_edited_document_round_trips() {
    let registry = registry();
    let mut doc = parse(
        "if header :contains \"Subject\" \"x\" { keep; }",
        &registry,
        &Capabilities::none(),
    )
    .unwrap();

    let header = match doc.commands_mut()[0].element_mut("test").unwrap().value_mut() {
        ElementValue::Test(Some(test)) => test,
        other => panic!("unexpected value {:?}", other),
    };
    header.set_enabled("match-type", false).unwrap();
    // the disabled tag still holds :contains
    assert_eq!(
        header.element("match-type").unwrap().tag().map(|t| t.token()),
        Some(":contains")
    );

    let text = serialize(&doc).unwrap();
    assert_eq!(text, "if header \"Subject\" \"x\" {\n  keep;\n}\n");
    let again = parse(&text, &registry, &Capabilities::none()).unwrap();
    assert_eq!(again, doc);
    assert_eq!(serialize(&again).unwrap(), text);
}

#[test]
fn test_enabled_tags_still_compare_values() {
    let registry = registry();
    let contains = parse_test("header :contains \"a\" \"b\"", &registry, &Capabilities::none())
        .unwrap();
    let matches = parse_test("header :matches \"a\" \"b\"", &registry, &Capabilities::none())
        .unwrap();
    assert_ne!(contains, matches);
}
