//! End-to-end swaps through the sandbox runtime

use hotswap_bytecode::opcodes::*;
use hotswap_bytecode::{decode, encode, to_internal_name, FieldNode, Insn, JavaType, MethodNode, UnitNode};
use hotswap_core::{
    HotSwapEngine, LoadedType, Loader, ObjectFactory, Runtime, RuntimeError, SandboxFactory,
    SandboxRuntime, SwapError, SwapErrorKind, SwapOutcome, SwapState, UnitTransformer, Value,
};
use hotswap_registry::{GenerationRegistry, Scope};
use hotswap_test_utils::{
    construction, default_init, loader_unit, static_method, Call, Heap, Host, MachineError,
    RecordingHost, StackMachine, Value as MValue, LOAD_CLASS, LOAD_CLASS_DESC, OBJECT, URL_LOADER,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

const WIDGET: &str = "demo/Widget";
const GADGET: &str = "demo/Gadget";
const MAIN: &str = "demo/Main";

struct Fixture {
    registry: Arc<GenerationRegistry<LoadedType>>,
    runtime: Arc<SandboxRuntime>,
    engine: HotSwapEngine,
}

fn fixture() -> Fixture {
    let registry = Arc::new(GenerationRegistry::new());
    let runtime = Arc::new(SandboxRuntime::with_transformer(
        Arc::clone(&registry),
        UnitTransformer::default(),
    ));
    let engine = HotSwapEngine::new(Arc::clone(&runtime) as Arc<dyn Runtime>, Arc::clone(&registry));
    Fixture {
        registry,
        runtime,
        engine,
    }
}

/// `demo/Widget` with `fields` int fields
fn widget(fields: usize) -> UnitNode {
    let mut u = UnitNode::new(WIDGET, Some(OBJECT.to_string()));
    u.methods.push(default_init(OBJECT));
    for i in 0..fields {
        u.fields.push(FieldNode::new(ACC_PRIVATE, format!("f{i}"), "I"));
    }
    u
}

/// `demo/Gadget` constructible from `(int, String)`
fn gadget() -> UnitNode {
    let mut u = UnitNode::new(GADGET, Some(OBJECT.to_string()));
    u.methods.push(
        MethodNode::new(ACC_PUBLIC, "<init>", "(ILjava/lang/String;)V").with_code(
            vec![
                Insn::var(ALOAD, 0),
                Insn::method(INVOKESPECIAL, OBJECT, "<init>", "()V"),
                Insn::simple(RETURN),
            ],
            1,
            3,
        ),
    );
    u
}

/// `demo/Main.build(int, String)`: `Widget w = new Widget(); return new Gadget(n, s);`
fn main_unit() -> UnitNode {
    let mut body = construction(WIDGET, "()V", vec![], true);
    body.push(Insn::var(ASTORE, 2));
    body.extend(construction(
        GADGET,
        "(ILjava/lang/String;)V",
        vec![Insn::var(ILOAD, 0), Insn::var(ALOAD, 1)],
        true,
    ));
    body.push(Insn::simple(ARETURN));

    let mut u = UnitNode::new(MAIN, Some(OBJECT.to_string()));
    u.methods.push(default_init(OBJECT));
    u.methods.push(static_method("build", "(ILjava/lang/String;)Ldemo/Gadget;", body, 4, 3));
    u
}

fn bytes(unit: &UnitNode) -> Vec<u8> {
    encode(unit).unwrap()
}

/// Converts a stack machine value into a factory argument
fn factory_value(heap: &Heap, value: &MValue) -> Value {
    match value {
        MValue::Int(v) => Value::Int(*v),
        MValue::Long(v) => Value::Long(*v),
        MValue::Float(v) => Value::Float(*v),
        MValue::Double(v) => Value::Double(*v),
        MValue::Str(s) => Value::Str(s.clone()),
        MValue::Ref(_) => match heap.unboxed(value) {
            Some((_, inner)) => factory_value(heap, inner),
            None => Value::Null,
        },
        MValue::Null | MValue::Type(_) => Value::Null,
    }
}

/// Host bridging `Factory.construct` to a sandbox factory
struct FactoryHost<'a> {
    factory: &'a SandboxFactory,
    built: Vec<(String, Vec<JavaType>, usize)>,
}

impl Host for FactoryHost<'_> {
    fn invoke(&mut self, heap: &mut Heap, call: &Call) -> Result<Option<MValue>, MachineError> {
        if call.name != "construct" {
            return Err(MachineError::Host(format!("{}.{}", call.owner, call.name)));
        }
        let MValue::Str(name) = &call.args[0] else {
            return Err(MachineError::BadOperand(format!("{:?}", call.args[0])));
        };
        let types = heap
            .array_items(&call.args[1])
            .ok_or_else(|| MachineError::BadOperand("types".into()))?
            .iter()
            .map(|v| match v {
                MValue::Type(t) => Ok(t.clone()),
                other => Err(MachineError::BadOperand(format!("{other:?}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let values: Vec<Value> = heap
            .array_items(&call.args[2])
            .ok_or_else(|| MachineError::BadOperand("values".into()))?
            .iter()
            .map(|v| factory_value(heap, v))
            .collect();

        let count = values.len();
        let instance = self
            .factory
            .construct(name, &types, values)
            .map_err(|e| MachineError::Host(e.to_string()))?;
        self.built.push((instance.type_name().to_string(), types, count));
        Ok(Some(heap.alloc_instance(instance.type_name())))
    }
}

fn generation_records(registry: &GenerationRegistry<LoadedType>, logical: &str) -> usize {
    registry
        .snapshot()
        .iter()
        .filter(|r| r.logical_name == logical && r.generation.is_some())
        .count()
}

#[test]
fn compatible_change_is_redefined_in_place() {
    let f = fixture();
    let original = f.runtime.primary().load_unit(&bytes(&widget(1))).unwrap();

    let mut changed = widget(1);
    changed.source_file = Some("Widget.v2".into());
    let outcome = f.engine.submit(&bytes(&changed)).unwrap();

    assert!(matches!(outcome, SwapOutcome::Redefined { .. }));
    assert_eq!(
        outcome.history(),
        &[SwapState::Resolve, SwapState::AttemptLiveSwap, SwapState::Done]
    );
    assert_eq!(outcome.internal_name(), WIDGET);
    assert_eq!(original.redefinitions(), 1);
    assert_eq!(
        decode(&original.content()).unwrap().source_file.as_deref(),
        Some("Widget.v2")
    );
    assert_eq!(generation_records(&f.registry, WIDGET), 0);
    assert_eq!(f.runtime.primary().resolve(WIDGET).unwrap().id(), original.id());

    let stats = f.engine.stats();
    assert_eq!((stats.redefined, stats.overridden), (1, 0));
}

#[test]
fn incompatible_change_installs_generation_zero() {
    let f = fixture();
    let original = f.runtime.primary().load_unit(&bytes(&widget(0))).unwrap();

    let outcome = f.engine.submit(&bytes(&widget(1))).unwrap();
    assert_eq!(
        outcome.history(),
        &[
            SwapState::Resolve,
            SwapState::AttemptLiveSwap,
            SwapState::Fallback,
            SwapState::Done,
        ]
    );
    let SwapOutcome::Overridden {
        internal_name,
        generation,
        registered,
        superseded,
        ..
    } = &outcome
    else {
        panic!("expected an override, got {outcome}");
    };
    assert_eq!(internal_name, "demo/Widget$HCR$0");
    assert_eq!(*generation, 0);
    assert!(*registered);
    assert!(superseded.is_none());
    assert_eq!(original.redefinitions(), 0);

    let active = f.registry.active_record(Scope::Global, WIDGET).unwrap();
    assert_eq!(active.internal_name, "demo/Widget$HCR$0");
    assert_eq!(active.generation, Some(0));
    assert_eq!(f.registry.get(WIDGET).unwrap().internal_name(), "demo/Widget$HCR$0");

    let installed = decode(&f.registry.get(WIDGET).unwrap().content()).unwrap();
    assert_eq!(installed.name, "demo/Widget$HCR$0");
    assert_eq!(installed.super_name.as_deref(), Some(WIDGET));
    assert_eq!(installed.fields.len(), 1);
}

#[test]
fn later_resolution_uses_the_registry_without_a_lookup() {
    let f = fixture();
    f.runtime.primary().load_unit(&bytes(&widget(0))).unwrap();
    f.engine.submit(&bytes(&widget(1))).unwrap();

    let lookups = f.runtime.primary().underlying_lookups();
    let resolved = f.runtime.primary().resolve(WIDGET).unwrap();
    assert_eq!(resolved.internal_name(), "demo/Widget$HCR$0");
    assert_eq!(f.runtime.primary().underlying_lookups(), lookups);
}

#[test]
fn second_fallback_supersedes_the_first() {
    let f = fixture();
    f.runtime.primary().load_unit(&bytes(&widget(0))).unwrap();
    f.engine.submit(&bytes(&widget(1))).unwrap();

    let outcome = f.engine.submit(&bytes(&widget(2))).unwrap();
    let SwapOutcome::Overridden {
        generation,
        superseded,
        ..
    } = &outcome
    else {
        panic!("expected an override, got {outcome}");
    };
    assert_eq!(*generation, 1);
    let old = superseded.as_ref().unwrap();
    assert_eq!(old.internal_name, "demo/Widget$HCR$0");
    assert_eq!(old.generation, Some(0));
    assert!(!old.active);

    assert_eq!(f.runtime.primary().resolve(WIDGET).unwrap().internal_name(), "demo/Widget$HCR$1");
    assert_eq!(generation_records(&f.registry, WIDGET), 1);
}

#[test]
fn compatible_change_to_a_generation_redefines_it() {
    let f = fixture();
    f.runtime.primary().load_unit(&bytes(&widget(0))).unwrap();
    f.engine.submit(&bytes(&widget(1))).unwrap();

    let mut same_shape = widget(1);
    same_shape.source_file = Some("again".into());
    let outcome = f.engine.submit(&bytes(&same_shape)).unwrap();

    assert!(matches!(outcome, SwapOutcome::Redefined { .. }));
    assert_eq!(outcome.internal_name(), "demo/Widget$HCR$0");
    assert_eq!(f.registry.get(WIDGET).unwrap().redefinitions(), 1);
}

#[test]
fn hooked_loader_resolution_follows_the_registry() {
    let f = fixture();
    f.runtime.primary().load_unit(&bytes(&widget(0))).unwrap();
    f.engine.submit(&bytes(&widget(1))).unwrap();

    let original = bytes(&loader_unit("demo/PluginLoader", URL_LOADER));
    let rewritten = UnitTransformer::default()
        .transform(&**f.runtime.primary(), "demo/PluginLoader", &original)
        .into_owned();
    let loader = decode(&rewritten).unwrap();
    let load_class = loader.method(LOAD_CLASS, LOAD_CLASS_DESC).unwrap();

    let registry = Arc::clone(&f.registry);
    let mut host = RecordingHost::new(move |_heap: &mut Heap, call: &Call| match call.name.as_str() {
        "get" => {
            let MValue::Str(name) = &call.args[1] else {
                return Err(MachineError::BadOperand(format!("{:?}", call.args[1])));
            };
            Ok(Some(registry.get(&to_internal_name(name)).map_or(MValue::Null, |t| {
                MValue::Type(JavaType::object(t.internal_name()))
            })))
        }
        "put" => Ok(None),
        "loadClass" => Ok(Some(MValue::Type(JavaType::object("demo/Stale")))),
        other => Err(MachineError::Host(other.to_string())),
    });

    let out = StackMachine::new()
        .run(
            &mut host,
            load_class,
            vec![MValue::Str("loader".into()), MValue::Str("demo.Widget".into()), MValue::Int(0)],
        )
        .unwrap();
    assert_eq!(out, Some(MValue::Type(JavaType::object("demo/Widget$HCR$0"))));
    assert_eq!(host.calls_to(URL_LOADER, LOAD_CLASS).count(), 0);
}

#[test]
fn construction_follows_the_active_generation() {
    let f = fixture();
    let primary = f.runtime.primary();
    primary.load_unit(&bytes(&widget(0))).unwrap();
    primary.load_unit(&bytes(&gadget())).unwrap();
    primary.load_unit(&bytes(&main_unit())).unwrap();

    let main = decode(&primary.defined(MAIN).unwrap().content()).unwrap();
    let build = main.method("build", "(ILjava/lang/String;)Ldemo/Gadget;").unwrap().clone();
    let factory = SandboxFactory::new(Arc::clone(&f.runtime));

    let run = |factory: &SandboxFactory| {
        let mut host = FactoryHost {
            factory,
            built: Vec::new(),
        };
        let mut vm = StackMachine::new().with_supertype("demo/Widget$HCR$0", WIDGET);
        let out = vm
            .run(&mut host, &build, vec![MValue::Int(7), MValue::Str("seven".into())])
            .unwrap()
            .unwrap();
        assert_eq!(vm.heap.class_of(&out), Some(GADGET));
        host.built
    };

    let before = run(&factory);
    assert_eq!(
        before,
        vec![
            (WIDGET.to_string(), vec![], 0),
            (
                GADGET.to_string(),
                vec![JavaType::Primitive(hotswap_bytecode::Primitive::Int), JavaType::object("java/lang/String")],
                2,
            ),
        ]
    );

    f.engine.submit(&bytes(&widget(3))).unwrap();
    let after = run(&factory);
    assert_eq!(after[0].0, "demo/Widget$HCR$0");
    assert_eq!(after[1].0, GADGET);
}

#[test]
fn empty_and_garbage_input_rejected() {
    let f = fixture();
    let empty = f.engine.submit(&[]).unwrap_err();
    assert_eq!(empty.kind(), SwapErrorKind::Input);
    let garbage = f.engine.submit(b"not a unit").unwrap_err();
    assert_eq!(garbage.kind(), SwapErrorKind::Input);
    assert_eq!(f.engine.stats().failed, 2);
}

#[test]
fn unknown_type_fails_resolution() {
    let f = fixture();
    let err = f.engine.submit(&bytes(&widget(0))).unwrap_err();
    assert_eq!(err.kind(), SwapErrorKind::Resolution);
    assert!(matches!(err, SwapError::Resolution { ref name, .. } if name == WIDGET));
    assert!(f.registry.is_empty());
}

#[test]
fn plain_loader_cannot_take_a_generation() {
    let f = fixture();
    let plain = f.runtime.add_loader("plain", false);
    plain.load_unit(&bytes(&widget(0))).unwrap();

    let err = f.engine.submit(&bytes(&widget(1))).unwrap_err();
    assert_eq!(err.kind(), SwapErrorKind::Define);
    assert!(matches!(
        err,
        SwapError::Define {
            source: RuntimeError::NotOverrideCapable(id),
            ..
        } if id == plain.id()
    ));
    assert_eq!(generation_records(&f.registry, WIDGET), 0);
}

/// Fixture whose engine has already installed generations 0 and 1
fn two_generations() -> Fixture {
    let f = fixture();
    f.runtime.primary().load_unit(&bytes(&widget(0))).unwrap();
    f.engine.submit(&bytes(&widget(1))).unwrap();
    f.engine.submit(&bytes(&widget(2))).unwrap();
    f
}

fn second_engine(f: &Fixture) -> HotSwapEngine {
    HotSwapEngine::new(Arc::clone(&f.runtime) as Arc<dyn Runtime>, Arc::clone(&f.registry))
}

#[test]
fn stale_generation_is_defined_but_not_registered() {
    let f = two_generations();
    let other = second_engine(&f).with_suffix("$B$");

    let outcome = other.submit(&bytes(&widget(3))).unwrap();
    let SwapOutcome::Overridden {
        internal_name,
        generation,
        registered,
        superseded,
        ..
    } = &outcome
    else {
        panic!("expected an override, got {outcome}");
    };
    assert_eq!(internal_name, "demo/Widget$B$0");
    assert_eq!(*generation, 0);
    assert!(!*registered);
    assert!(superseded.is_none());

    assert!(f.runtime.primary().defined("demo/Widget$B$0").is_some());
    let active = f.registry.active_record(Scope::Global, WIDGET).unwrap();
    assert_eq!(active.internal_name, "demo/Widget$HCR$1");
    assert_eq!(active.generation, Some(1));
    assert_eq!(other.stats().overridden, 1);
}

#[test]
fn colliding_generation_name_is_a_define_error() {
    let f = two_generations();
    let other = second_engine(&f);

    let err = other.submit(&bytes(&widget(3))).unwrap_err();
    assert_eq!(err.kind(), SwapErrorKind::Define);
    assert!(matches!(
        err,
        SwapError::Define {
            ref name,
            source: RuntimeError::DuplicateDefinition { .. },
        } if name == "demo/Widget$HCR$0"
    ));

    let active = f.registry.active_record(Scope::Global, WIDGET).unwrap();
    assert_eq!(active.internal_name, "demo/Widget$HCR$1");
    assert_eq!(generation_records(&f.registry, WIDGET), 1);
}

#[test]
fn deep_array_descriptor_is_rejected_without_state_change() {
    let f = fixture();
    f.runtime.primary().load_unit(&bytes(&widget(0))).unwrap();

    let deep = format!("({}I)V", "[".repeat(1_000_000));
    let mut hostile = widget(1);
    hostile.methods.push(static_method(
        "make",
        "()Ldemo/Gadget;",
        {
            let mut body = construction(GADGET, &deep, vec![], true);
            body.push(Insn::simple(ARETURN));
            body
        },
        2,
        0,
    ));

    let err = f.engine.submit(&bytes(&hostile)).unwrap_err();
    assert_eq!(err.kind(), SwapErrorKind::Rewrite);
    assert_eq!(generation_records(&f.registry, WIDGET), 0);
    assert_eq!(f.runtime.primary().resolve(WIDGET).unwrap().internal_name(), WIDGET);
}

#[test]
fn child_loader_generation_is_scoped_to_that_loader() {
    let f = fixture();
    let child = f.runtime.add_loader("plugins", true);
    child.load_unit(&bytes(&widget(0))).unwrap();

    let outcome = f.engine.submit(&bytes(&widget(1))).unwrap();
    assert_eq!(outcome.internal_name(), "demo/Widget$HCR$0");

    let scope = Scope::Loader(child.id());
    assert_eq!(
        f.registry.active_record(scope, WIDGET).unwrap().generation,
        Some(0)
    );
    assert!(f.registry.get(WIDGET).is_none());
    assert_eq!(child.resolve(WIDGET).unwrap().internal_name(), "demo/Widget$HCR$0");
    assert_eq!(child.defined("demo/Widget$HCR$0").unwrap().loader(), child.id());

    assert!(f.runtime.drop_loader(child.id()));
    assert!(f.registry.is_evicted(child.id()));
    assert!(f.registry.get_scoped(scope, WIDGET).is_none());
    let err = f.engine.submit(&bytes(&widget(2))).unwrap_err();
    assert_eq!(err.kind(), SwapErrorKind::Resolution);
}

#[test]
fn concurrent_submissions_get_distinct_generations() {
    let f = fixture();
    f.runtime.primary().load_unit(&bytes(&widget(0))).unwrap();

    let mut generations: Vec<u64> = std::thread::scope(|s| {
        let handles: Vec<_> = (1..=6)
            .map(|fields| {
                let engine = &f.engine;
                s.spawn(move || match engine.submit(&bytes(&widget(fields))).unwrap() {
                    SwapOutcome::Overridden { generation, .. } => generation,
                    other => panic!("expected an override, got {other}"),
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    generations.sort_unstable();
    assert_eq!(generations, (0..6).collect::<Vec<u64>>());

    let active = f.registry.active_record(Scope::Global, WIDGET).unwrap();
    assert_eq!(active.generation, Some(5));
    assert_eq!(generation_records(&f.registry, WIDGET), 1);
}

proptest! {
    #[test]
    fn successive_fallbacks_increase_generation(count in 1usize..8) {
        let f = fixture();
        f.runtime.primary().load_unit(&bytes(&widget(0))).unwrap();

        let mut last = None;
        for fields in 1..=count {
            let outcome = f.engine.submit(&bytes(&widget(fields))).unwrap();
            let SwapOutcome::Overridden { generation, superseded, .. } = outcome else {
                panic!("expected an override");
            };
            prop_assert!(last.map_or(true, |prev| generation > prev));
            prop_assert_eq!(superseded.and_then(|r| r.generation), last);
            prop_assert_eq!(generation_records(&f.registry, WIDGET), 1);
            last = Some(generation);
        }
        prop_assert_eq!(
            f.registry.active_record(Scope::Global, WIDGET).unwrap().generation,
            last
        );
    }
}
