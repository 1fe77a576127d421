//! Rewritten bodies executed on the symbolic stack machine

use hotswap_bytecode::opcodes::*;
use hotswap_bytecode::{to_internal_name, Insn, JavaType, MethodNode, Primitive};
use hotswap_rewrite::{rewrite_method, ConstructionSiteRewriter, HostSymbols, UnitRewriter};
use hotswap_test_utils::{
    construction, loader_unit, static_method, Call, Heap, MachineError, RecordingHost,
    StackMachine, Value, URL_LOADER,
};
use pretty_assertions::assert_eq;

/// Factory host: builds an instance of the named type and records the call
fn factory_host() -> RecordingHost<impl FnMut(&mut Heap, &Call) -> Result<Option<Value>, MachineError>> {
    RecordingHost::new(|heap: &mut Heap, call: &Call| {
        if call.name != "construct" {
            return Err(MachineError::Host(call.name.clone()));
        }
        match &call.args[0] {
            Value::Str(name) => Ok(Some(heap.alloc_instance(to_internal_name(name)))),
            other => Err(MachineError::BadOperand(format!("{other:?}"))),
        }
    })
}

fn rewrite_static(method: &mut MethodNode) -> usize {
    let mut r = ConstructionSiteRewriter::new(&HostSymbols::default(), "demo/Main", method);
    rewrite_method(method, &mut r).unwrap().rewritten
}

#[test]
fn two_independent_sites_get_distinct_factory_calls() {
    // A a = new A(int, String); B b = new B(double); return b;
    let mut body = construction(
        "demo/A",
        "(ILjava/lang/String;)V",
        vec![Insn::var(ILOAD, 0), Insn::var(ALOAD, 1)],
        true,
    );
    body.push(Insn::var(ASTORE, 4));
    body.extend(construction("demo/B", "(D)V", vec![Insn::var(DLOAD, 2)], true));
    body.push(Insn::simple(ARETURN));
    let mut m = static_method("build", "(ILjava/lang/String;D)Ldemo/B;", body, 4, 5);

    assert_eq!(rewrite_static(&mut m), 2);

    let mut host = factory_host();
    let mut vm = StackMachine::new();
    let result = vm
        .run(
            &mut host,
            &m,
            vec![Value::Int(5), Value::Str("five".into()), Value::Double(2.5)],
        )
        .unwrap()
        .unwrap();
    assert_eq!(vm.heap.class_of(&result), Some("demo/B"));

    let calls: Vec<&Call> = host.calls_to("hotswap/runtime/Factory", "construct").collect();
    assert_eq!(calls.len(), 2);

    let a = calls[0];
    assert_eq!(a.args[0], Value::Str("demo.A".into()));
    assert_eq!(
        vm.heap.array_items(&a.args[1]).unwrap(),
        &[
            Value::Type(JavaType::Primitive(Primitive::Int)),
            Value::Type(JavaType::object("java/lang/String")),
        ]
    );
    let a_values = vm.heap.array_items(&a.args[2]).unwrap();
    assert_eq!(a_values.len(), 2);
    assert_eq!(
        vm.heap.unboxed(&a_values[0]),
        Some((Primitive::Int, &Value::Int(5)))
    );
    assert_eq!(a_values[1], Value::Str("five".into()));

    let b = calls[1];
    assert_eq!(b.args[0], Value::Str("demo.B".into()));
    assert_eq!(
        vm.heap.array_items(&b.args[1]).unwrap(),
        &[Value::Type(JavaType::Primitive(Primitive::Double))]
    );
    let b_values = vm.heap.array_items(&b.args[2]).unwrap();
    assert_eq!(b_values.len(), 1);
    assert_eq!(
        vm.heap.unboxed(&b_values[0]),
        Some((Primitive::Double, &Value::Double(2.5)))
    );
}

#[test]
fn undup_site_discards_result() {
    let mut body = construction("demo/Logger", "()V", vec![], false);
    body.push(Insn::simple(RETURN));
    let mut m = static_method("touch", "()V", body, 1, 0);
    assert_eq!(rewrite_static(&mut m), 1);

    let mut host = factory_host();
    let out = StackMachine::new().run(&mut host, &m, vec![]).unwrap();
    assert_eq!(out, None);
    assert_eq!(host.calls.len(), 1);
}

#[test]
fn nested_site_passes_inner_object_to_outer_factory() {
    // return new Outer(new Inner(3L));
    let inner = construction("demo/Inner", "(J)V", vec![Insn::var(LLOAD, 0)], true);
    let mut body = construction("demo/Outer", "(Ldemo/Inner;)V", inner, true);
    body.push(Insn::simple(ARETURN));
    let mut m = static_method("nest", "(J)Ldemo/Outer;", body, 6, 2);
    assert_eq!(rewrite_static(&mut m), 2);

    let mut host = factory_host();
    let mut vm = StackMachine::new();
    let out = vm.run(&mut host, &m, vec![Value::Long(3)]).unwrap().unwrap();
    assert_eq!(vm.heap.class_of(&out), Some("demo/Outer"));

    let outer = &host.calls[1];
    let values = vm.heap.array_items(&outer.args[2]).unwrap();
    assert_eq!(vm.heap.class_of(&values[0]), Some("demo/Inner"));
}

/// Registry host backed by a single optional cached class
fn registry_host(
    cached: Option<&'static str>,
) -> RecordingHost<impl FnMut(&mut Heap, &Call) -> Result<Option<Value>, MachineError>> {
    RecordingHost::new(move |_heap: &mut Heap, call: &Call| match call.name.as_str() {
        "get" => Ok(Some(
            cached.map_or(Value::Null, |c| Value::Type(JavaType::object(c))),
        )),
        "put" => Ok(None),
        "loadClass" => Ok(Some(Value::Type(JavaType::object("demo/Fresh")))),
        other => Err(MachineError::Host(other.to_string())),
    })
}

#[test]
fn hooked_resolution_short_circuits_on_registry_hit() {
    let mut unit = loader_unit("demo/PluginLoader", URL_LOADER);
    UnitRewriter::default().rewrite(&mut unit).unwrap();
    let load = unit
        .method("loadClass", "(Ljava/lang/String;Z)Ljava/lang/Class;")
        .unwrap();

    let mut host = registry_host(Some("demo/Widget$HCR$0"));
    let this = Value::Str("loader".into());
    let out = StackMachine::new()
        .run(&mut host, load, vec![this, Value::Str("demo.Widget".into()), Value::Int(0)])
        .unwrap();

    assert_eq!(out, Some(Value::Type(JavaType::object("demo/Widget$HCR$0"))));
    assert_eq!(host.calls_to(URL_LOADER, "loadClass").count(), 0);
    assert_eq!(host.calls_to("hotswap/runtime/Registry", "put").count(), 0);
}

#[test]
fn hooked_resolution_records_miss_result() {
    let mut unit = loader_unit("demo/PluginLoader", URL_LOADER);
    UnitRewriter::default().rewrite(&mut unit).unwrap();
    let load = unit
        .method("loadClass", "(Ljava/lang/String;Z)Ljava/lang/Class;")
        .unwrap();

    let mut host = registry_host(None);
    let this = Value::Str("loader".into());
    let out = StackMachine::new()
        .run(
            &mut host,
            load,
            vec![this.clone(), Value::Str("demo.Widget".into()), Value::Int(1)],
        )
        .unwrap();

    assert_eq!(out, Some(Value::Type(JavaType::object("demo/Fresh"))));
    assert_eq!(host.calls_to(URL_LOADER, "loadClass").count(), 1);
    let puts: Vec<&Call> = host.calls_to("hotswap/runtime/Registry", "put").collect();
    assert_eq!(puts.len(), 1);
    assert_eq!(
        puts[0].args,
        vec![
            this,
            Value::Str("demo.Widget".into()),
            Value::Type(JavaType::object("demo/Fresh")),
        ]
    );
}
