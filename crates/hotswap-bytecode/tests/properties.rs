//! Descriptor and codec invariants over generated input

use hotswap_bytecode::opcodes::*;
use hotswap_bytecode::{
    decode, encode, stack_effect, CodecError, DescriptorError, FieldNode, Insn, JavaType,
    MethodDescriptor, Primitive, ReturnType, UnitNode, FORMAT_VERSION, MAGIC, MAX_ARRAY_DIMENSIONS,
};
use proptest::prelude::*;

fn arb_type() -> impl Strategy<Value = JavaType> {
    let leaf = prop_oneof![
        proptest::sample::select(Primitive::ALL.to_vec()).prop_map(JavaType::Primitive),
        "[a-z]{1,6}(/[A-Z][a-z]{0,6}){1,3}".prop_map(JavaType::Object),
    ];
    leaf.prop_recursive(4, 8, 1, |inner| inner.prop_map(|t| JavaType::Array(Box::new(t))))
}

fn header() -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    out
}

proptest! {
    #[test]
    fn method_descriptor_text_is_stable(
        params in proptest::collection::vec(arb_type(), 0..6),
        ret in proptest::option::of(arb_type()),
    ) {
        let md = MethodDescriptor {
            params,
            ret: ret.map_or(ReturnType::Void, ReturnType::Value),
        };
        let text = md.to_string();
        let parsed = MethodDescriptor::parse(&text).unwrap();
        prop_assert_eq!(parsed.to_string(), text);
        prop_assert_eq!(parsed, md);
    }

    #[test]
    fn descriptor_parse_never_panics(text in "[\\[()LIJDVZ;a-z/]{0,40}") {
        let _ = JavaType::parse(&text);
        let _ = MethodDescriptor::parse(&text);
    }

    #[test]
    fn array_depth_is_bounded(extra in 1usize..10_000) {
        let text = format!("{}J", "[".repeat(MAX_ARRAY_DIMENSIONS + extra));
        prop_assert_eq!(
            JavaType::parse(&text),
            Err(DescriptorError::TooManyDimensions { dimensions: MAX_ARRAY_DIMENSIONS + extra })
        );
    }

    #[test]
    fn invoke_effect_matches_descriptor(
        params in proptest::collection::vec(arb_type(), 0..6),
        opcode in proptest::sample::select(vec![
            INVOKEVIRTUAL, INVOKESPECIAL, INVOKESTATIC, INVOKEINTERFACE, INVOKEDYNAMIC,
        ]),
    ) {
        let md = MethodDescriptor { params, ret: ReturnType::Value(JavaType::Primitive(Primitive::Long)) };
        let effect = stack_effect(&Insn::method(opcode, "demo/A", "m", md.to_string())).unwrap();
        let receiver = u16::from(opcode != INVOKESTATIC && opcode != INVOKEDYNAMIC);
        prop_assert_eq!(effect.pops, md.arg_slots() + receiver);
        prop_assert_eq!(effect.pushes, 2);
    }

    #[test]
    fn garbage_body_is_a_typed_error(body in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut bytes = header();
        bytes.extend_from_slice(&body);
        match decode(&bytes) {
            Ok(unit) => prop_assert!(!unit.name.is_empty()),
            Err(e) => prop_assert!(matches!(e, CodecError::Malformed(_)), "{e:?}"),
        }
    }

    #[test]
    fn decoded_unit_keeps_fields(names in proptest::collection::btree_set("[a-z]{1,8}", 0..8)) {
        let mut unit = UnitNode::new("demo/Bag", Some("java/lang/Object".into()));
        for name in &names {
            unit.fields.push(FieldNode::new(ACC_PRIVATE, name.clone(), "J"));
        }
        let decoded = decode(&encode(&unit).unwrap()).unwrap();
        let decoded_names: Vec<&str> = decoded.fields.iter().map(|f| f.name.as_str()).collect();
        prop_assert_eq!(decoded_names, names.iter().map(String::as_str).collect::<Vec<_>>());
    }
}
