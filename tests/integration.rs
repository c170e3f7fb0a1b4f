//! End-to-end exercises of the loader, validator, store and interpreter
//! against small inline modules, in place of the external `.wast` fixture
//! suite this crate has no network access to fetch.

use k23_vm::{Config, Extern, Instance, Linker, Module, Store, Trap, Val};
use std::sync::Arc;

fn compile(text: &str) -> Module {
    Module::from_str(text, &Config::default()).expect("module should validate")
}

fn instantiate(store: &mut Store, text: &str) -> Instance {
    let module = Arc::new(compile(text));
    Instance::new(store, module).expect("instantiation should succeed")
}

#[test_log::test]
fn call_and_recursion() {
    let mut store = Store::new(Config::default());
    let instance = instantiate(
        &mut store,
        r#"
        (module
            (func $fib (export "fib") (param $n i32) (result i32)
                (if (result i32) (i32.lt_s (local.get $n) (i32.const 2))
                    (then (local.get $n))
                    (else
                        (i32.add
                            (call $fib (i32.sub (local.get $n) (i32.const 1)))
                            (call $fib (i32.sub (local.get $n) (i32.const 2)))))))
        )
        "#,
    );

    let func = instance.get_export(&store, "fib").unwrap().into_func().unwrap();
    let mut results = [Val::I32(0)];
    func.call(&mut store, &[Val::I32(10)], &mut results).unwrap();
    assert_eq!(results[0], Val::I32(55));
}

#[test_log::test]
fn globals_and_memory() {
    let mut store = Store::new(Config::default());
    let instance = instantiate(
        &mut store,
        r#"
        (module
            (memory (export "mem") 1)
            (global $counter (export "counter") (mut i32) (i32.const 0))

            (func (export "bump") (result i32)
                (global.set $counter (i32.add (global.get $counter) (i32.const 1)))
                (global.get $counter))

            (func (export "store_and_load") (param $addr i32) (param $val i32) (result i32)
                (i32.store (local.get $addr) (local.get $val))
                (i32.load (local.get $addr)))
        )
        "#,
    );

    let bump = instance.get_export(&store, "bump").unwrap().into_func().unwrap();
    let mut out = [Val::I32(0)];
    bump.call(&mut store, &[], &mut out).unwrap();
    bump.call(&mut store, &[], &mut out).unwrap();
    assert_eq!(out[0], Val::I32(2));

    let rw = instance
        .get_export(&store, "store_and_load")
        .unwrap()
        .into_func()
        .unwrap();
    rw.call(&mut store, &[Val::I32(0), Val::I32(42)], &mut out).unwrap();
    assert_eq!(out[0], Val::I32(42));
}

#[test_log::test]
fn table_call_indirect_traps_on_null() {
    let mut store = Store::new(Config::default());
    let instance = instantiate(
        &mut store,
        r#"
        (module
            (type $sig (func (result i32)))
            (table 1 funcref)
            (func (export "call_slot_0") (result i32)
                (call_indirect (type $sig) (i32.const 0)))
        )
        "#,
    );

    let call_slot_0 = instance
        .get_export(&store, "call_slot_0")
        .unwrap()
        .into_func()
        .unwrap();
    let mut out = [Val::I32(0)];
    let err = call_slot_0.call(&mut store, &[], &mut out).unwrap_err();
    assert!(matches!(err, k23_vm::Error::Trap(Trap::IndirectCallToNull)));
}

#[test_log::test]
fn division_by_zero_traps() {
    let mut store = Store::new(Config::default());
    let instance = instantiate(
        &mut store,
        r#"
        (module
            (func (export "div") (param i32 i32) (result i32)
                (i32.div_s (local.get 0) (local.get 1)))
        )
        "#,
    );

    let div = instance.get_export(&store, "div").unwrap().into_func().unwrap();
    let mut out = [Val::I32(0)];
    let err = div.call(&mut store, &[Val::I32(1), Val::I32(0)], &mut out).unwrap_err();
    assert!(matches!(err, k23_vm::Error::Trap(Trap::IntegerDivisionByZero)));
}

#[test_log::test]
fn linking_across_modules() {
    let mut store = Store::new(Config::default());
    let producer = instantiate(
        &mut store,
        r#"(module (func (export "answer") (result i32) (i32.const 42)))"#,
    );
    store.register_module("producer", producer.addr());

    let linker = Linker::new();
    let consumer_module = Arc::new(compile(
        r#"
        (module
            (import "producer" "answer" (func $answer (result i32)))
            (func (export "doubled") (result i32)
                (i32.mul (call $answer) (i32.const 2))))
        "#,
    ));
    let consumer = linker.instantiate(&mut store, consumer_module).unwrap();

    let doubled = consumer.get_export(&store, "doubled").unwrap().into_func().unwrap();
    let mut out = [Val::I32(0)];
    doubled.call(&mut store, &[], &mut out).unwrap();
    assert_eq!(out[0], Val::I32(84));
}

#[test_log::test]
fn host_function_via_linker() {
    let mut store = Store::new(Config::default());
    let mut linker = Linker::new();

    let ty = k23_vm::FuncType::new(
        Box::from([k23_vm::ValType::I32, k23_vm::ValType::I32]),
        Box::from([k23_vm::ValType::I32]),
    );
    let addr = store.define_host_func(
        ty,
        Box::new(|_caller, params, results| {
            let Val::I32(a) = params[0] else { unreachable!() };
            let Val::I32(b) = params[1] else { unreachable!() };
            results[0] = Val::I32(a + b);
            Ok(())
        }),
    );
    linker.define("host", "add", Extern::Func(addr));

    let module = Arc::new(compile(
        r#"
        (module
            (import "host" "add" (func $add (param i32 i32) (result i32)))
            (func (export "add_one") (param i32) (result i32)
                (call $add (local.get 0) (i32.const 1))))
        "#,
    ));
    let instance = linker.instantiate(&mut store, module).unwrap();

    let add_one = instance.get_export(&store, "add_one").unwrap().into_func().unwrap();
    let mut out = [Val::I32(0)];
    add_one.call(&mut store, &[Val::I32(9)], &mut out).unwrap();
    assert_eq!(out[0], Val::I32(10));
}
