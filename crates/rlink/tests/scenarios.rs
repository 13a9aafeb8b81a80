//! Integration tests against a live embedded R.
//!
//! These tests initialize R once for the whole process and run serially
//! under a shared lock. When no R installation is found, every test
//! skips instead of failing.

use once_cell::sync::OnceCell;
use rlink::convert::{self, Value};
use rlink::error::LinkError;
use rlink::vector::{
    BufferView, Closure, Environment, IntVector, LogicalVector, StrVector, buffer_view,
};
use rlink::{RObject, SexpType, eval, protect, session};
use std::sync::Mutex;

/// Global lock to ensure R tests run serially (R is not thread-safe).
static R_LOCK: OnceCell<Mutex<()>> = OnceCell::new();

/// Initialize R once for all tests.
fn ensure_r_initialized() -> bool {
    static R_INITIALIZED: OnceCell<bool> = OnceCell::new();

    *R_INITIALIZED.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        match session::init() {
            Ok(_) => true,
            Err(e) => {
                eprintln!("Failed to initialize R: {}", e);
                false
            }
        }
    })
}

/// Run a test with the R lock held, or skip when R is unavailable.
fn with_r<F, T>(f: F) -> Option<T>
where
    F: FnOnce() -> T,
{
    if !ensure_r_initialized() {
        return None;
    }

    let lock = R_LOCK.get_or_init(|| Mutex::new(()));
    let _guard = lock.lock().unwrap();
    Some(f())
}

// Scenario: a host handle must keep its referent alive across foreign
// garbage collection, and dropping one of two handles must not release
// the object.

#[test]
fn handle_survives_foreign_gc() {
    with_r(|| {
        let v = eval::parse_eval("c(10L, 20L, 30L)").expect("eval should succeed");
        let addr = v.addr();
        assert!(protect::is_protected(addr));

        let second = v.clone();
        assert_eq!(protect::protection_count(addr), 2);

        // Force a full foreign collection while both handles are live
        eval::parse_eval("invisible(gc())").expect("gc should succeed");

        drop(second);
        assert_eq!(protect::protection_count(addr), 1);

        // The object is still readable after gc and the partial release
        let v = IntVector::from_object(v).expect("should be an integer vector");
        assert_eq!(v.get(0).unwrap(), Some(10));
        assert_eq!(v.get(2).unwrap(), Some(30));
    });
}

#[test]
fn na_round_trips_through_r() {
    with_r(|| {
        let v = IntVector::from_slice(&[Some(1), None, Some(3)]).expect("construction");
        let global = Environment::global().expect("global env");
        global.set("na_probe", v.object()).expect("set");

        // R itself must agree about which element is missing
        let mask = eval::parse_eval("is.na(na_probe)").expect("eval");
        let mask = LogicalVector::from_object(mask).expect("logical");
        assert_eq!(mask.to_vec().unwrap(), vec![
            Some(false),
            Some(true),
            Some(false)
        ]);

        global.remove("na_probe").expect("remove");
    });
}

#[test]
fn string_na_uses_the_singleton() {
    with_r(|| {
        let v = StrVector::from_slice(&[Some("a"), None]).expect("construction");
        assert_eq!(v.get(0).unwrap(), Some("a".to_string()));
        assert_eq!(v.get(1).unwrap(), None);

        let global = Environment::global().expect("global env");
        global.set("str_probe", v.object()).expect("set");
        let mask = eval::parse_eval("is.na(str_probe)").expect("eval");
        let mask = LogicalVector::from_object(mask).expect("logical");
        assert_eq!(mask.to_vec().unwrap(), vec![Some(false), Some(true)]);
        global.remove("str_probe").expect("remove");
    });
}

// Scenario: slicing copies. Writes to the slice must never show through
// to the source vector.

#[test]
fn slice_is_an_independent_copy() {
    with_r(|| {
        let v = IntVector::from_slice(&[Some(1), Some(2), Some(3), Some(4), Some(5)])
            .expect("construction");
        let s = v.slice(1, 4).expect("slice");
        assert_eq!(s.to_vec().unwrap(), vec![Some(2), Some(3), Some(4)]);

        s.set(0, Some(99)).expect("set");
        assert_eq!(s.get(0).unwrap(), Some(99));
        assert_eq!(v.get(1).unwrap(), Some(2));

        // And the other direction
        v.set(2, Some(-7)).expect("set");
        assert_eq!(s.get(1).unwrap(), Some(3));
    });
}

#[test]
fn negative_indices_address_from_the_end() {
    with_r(|| {
        let v = IntVector::from_slice(&[Some(1), Some(2), Some(3)]).expect("construction");
        assert_eq!(v.get(-1).unwrap(), Some(3));
        assert_eq!(v.get(-3).unwrap(), Some(1));
        assert!(matches!(
            v.get(3),
            Err(LinkError::IndexOutOfRange { index: 3, length: 3 })
        ));
        assert!(matches!(
            v.get(-4),
            Err(LinkError::IndexOutOfRange {
                index: -4,
                length: 3
            })
        ));
    });
}

#[test]
fn matrix_view_is_column_major() {
    with_r(|| {
        let m = eval::parse_eval("matrix(1:6, nrow = 2)").expect("eval");
        let m = IntVector::from_object(m).expect("integer matrix");
        let view = m.view().expect("view");
        assert_eq!(view.dims(), &[2, 3]);
        // Column-major: element (row 1, col 2) is the last of the buffer
        assert_eq!(view.get(&[0, 0]), Some(&1));
        assert_eq!(view.get(&[1, 0]), Some(&2));
        assert_eq!(view.get(&[0, 1]), Some(&3));
        assert_eq!(view.get(&[1, 2]), Some(&6));
    });
}

#[test]
fn plain_vector_view_is_rank_one() {
    with_r(|| {
        let v = IntVector::from_slice(&[Some(7), Some(8)]).expect("construction");
        let view = v.view().expect("view");
        assert_eq!(view.dims(), &[2]);
        assert_eq!(view.as_slice(), &[7, 8]);
    });
}

#[test]
fn dynamic_buffer_view_dispatches_on_the_tag() {
    with_r(|| {
        let v = eval::parse_eval("c(1.5, 2.5)").expect("eval");
        match buffer_view(&v).expect("view") {
            BufferView::Real(view) => assert_eq!(view.as_slice(), &[1.5, 2.5]),
            other => panic!("unexpected buffer kind: {:?}", other),
        }

        let s = eval::parse_eval("c(\"a\", \"b\")").expect("eval");
        assert!(matches!(
            buffer_view(&s),
            Err(LinkError::NoBufferView {
                actual: SexpType::StrSxp
            })
        ));
    });
}

// Scenario: conversion, including class-mapped dispatch on the dynamic
// class attribute.

#[test]
fn default_converter_round_trips_scalars() {
    with_r(|| {
        let conv = convert::default_converter();

        let obj = conv.to_foreign(&42i32).expect("to_foreign");
        assert_eq!(conv.to_host(&obj).unwrap(), Value::Int(vec![Some(42)]));

        let obj = conv.to_foreign(&true).expect("to_foreign");
        assert_eq!(conv.to_host(&obj).unwrap(), Value::Bool(vec![Some(true)]));

        let obj = conv.to_foreign(&String::from("hi")).expect("to_foreign");
        assert_eq!(
            conv.to_host(&obj).unwrap(),
            Value::Str(vec![Some("hi".to_string())])
        );
    });
}

#[test]
fn named_list_converts_to_named_value() {
    with_r(|| {
        let conv = convert::default_converter();
        let obj = eval::parse_eval("list(a = 1L, b = \"x\")").expect("eval");
        let value = conv.to_host(&obj).expect("to_host");
        assert_eq!(
            value,
            Value::Named(vec![
                (Some("a".to_string()), Value::Int(vec![Some(1)])),
                (Some("b".to_string()), Value::Str(vec![Some("x".to_string())])),
            ])
        );
    });
}

#[test]
fn class_map_overrides_the_base_rule() {
    with_r(|| {
        let base = convert::default_converter();
        let mut widgets = convert::Converter::empty("widgets");
        widgets.register_class(SexpType::VecSxp, "widget", |obj, _conv| {
            // Convert the body with the base rules; going through the
            // active converter here would re-enter this class map.
            let fields = match convert::default_converter().to_host(obj)? {
                Value::Named(fields) => fields,
                other => {
                    return Err(LinkError::Conversion(format!(
                        "widget body should be a named list, got {:?}",
                        other
                    )));
                }
            };
            Ok(Value::Custom {
                class: "widget".to_string(),
                fields,
            })
        });
        let conv = &base + &widgets;

        let obj =
            eval::parse_eval("structure(list(id = 7L), class = c(\"widget\", \"list\"))")
                .expect("eval");
        let value = conv.to_host(&obj).expect("to_host");
        assert_eq!(
            value,
            Value::Custom {
                class: "widget".to_string(),
                fields: vec![(Some("id".to_string()), Value::Int(vec![Some(7)]))],
            }
        );

        // Without the class map, the same object is an ordinary list
        let plain = base.to_host(&obj).expect("to_host");
        assert!(matches!(plain, Value::Named(_)));
    });
}

#[test]
fn scoped_converter_governs_to_host() {
    with_r(|| {
        convert::set_default_converter(convert::default_converter());
        let obj = eval::parse_eval("1L").expect("eval");

        let marker = {
            let mut c = convert::Converter::empty("marker");
            c.register_to_host(SexpType::IntSxp, |_, _| Ok(Value::Int(vec![Some(-1)])));
            c
        };
        {
            let _guard = convert::local_converter(marker);
            let current = convert::current_converter().unwrap();
            assert_eq!(current.to_host(&obj).unwrap(), Value::Int(vec![Some(-1)]));
        }
        let current = convert::current_converter().unwrap();
        assert_eq!(current.to_host(&obj).unwrap(), Value::Int(vec![Some(1)]));
    });
}

// Foreign-side errors must cross the boundary as data.

#[test]
fn r_errors_surface_with_their_message() {
    with_r(|| {
        let err = eval::parse_eval("stop(\"kaput\")").unwrap_err();
        match err {
            LinkError::RRuntime(message) => assert!(
                message.contains("kaput"),
                "unexpected message: {}",
                message
            ),
            other => panic!("unexpected error: {:?}", other),
        }

        // The session keeps working after a trapped error
        let v = eval::parse_eval("1 + 1").expect("eval after error");
        assert_eq!(v.sexp_type(), SexpType::RealSxp);
    });
}

#[test]
fn parse_errors_do_not_evaluate_anything() {
    with_r(|| {
        let global = Environment::global().expect("global env");
        let err = eval::parse_eval("parse_probe <- 1; 1 +* 2").unwrap_err();
        assert!(matches!(err, LinkError::Libr(_)));
        // The first statement never ran
        assert!(global.get("parse_probe").unwrap().is_none());
    });
}

// Environments.

#[test]
fn environment_bindings_round_trip() {
    with_r(|| {
        let env = Environment::new().expect("new env");
        assert!(env.get("x").unwrap().is_none());

        let v = IntVector::from_slice(&[Some(5)]).expect("construction");
        env.set("x", v.object()).expect("set");
        let got = env.get("x").unwrap().expect("bound");
        assert_eq!(got.sexp_type(), SexpType::IntSxp);
        assert!(env.names().unwrap().contains(&"x".to_string()));

        env.remove("x").expect("remove");
        assert!(env.get("x").unwrap().is_none());
    });
}

#[test]
fn locked_environment_rejects_mutation() {
    with_r(|| {
        let base = Environment::base().expect("base env");
        assert!(base.is_locked().unwrap());

        let v = IntVector::from_slice(&[Some(1)]).expect("construction");
        let err = base.set("smuggled", v.object()).unwrap_err();
        match err {
            LinkError::LockedEnvironment { name } => assert_eq!(name, "smuggled"),
            other => panic!("unexpected error: {:?}", other),
        }
    });
}

// Calls and closures.

#[test]
fn closures_are_callable_from_the_host() {
    with_r(|| {
        let f = eval::parse_eval("function(x, y = 1L) x + y").expect("eval");
        let f = Closure::from_object(f).expect("closure");

        let x = IntVector::from_slice(&[Some(41)]).expect("construction");
        let result = f.call(&[(Some("x"), x.into_object())]).expect("call");
        let result = IntVector::from_object(result).expect("integer result");
        assert_eq!(result.get(0).unwrap(), Some(42));
    });
}

#[test]
fn rebind_requires_matching_type() {
    with_r(|| {
        let mut obj: RObject = eval::parse_eval("1L").expect("eval");
        let other = eval::parse_eval("\"text\"").expect("eval");
        let err = obj.rebind(other.handle()).unwrap_err();
        assert!(matches!(
            err,
            LinkError::TypeMismatch {
                expected: SexpType::IntSxp,
                actual: SexpType::StrSxp,
            }
        ));

        let replacement = eval::parse_eval("2L").expect("eval");
        obj.rebind(replacement.handle()).expect("rebind");
        let v = IntVector::from_object(obj).expect("integer");
        assert_eq!(v.get(0).unwrap(), Some(2));
    });
}

#[test]
fn class_names_read_the_dynamic_class() {
    with_r(|| {
        let obj = eval::parse_eval("structure(1L, class = c(\"a\", \"b\"))").expect("eval");
        assert_eq!(obj.class_names().unwrap(), vec!["a", "b"]);

        let plain = eval::parse_eval("1L").expect("eval");
        assert!(plain.class_names().unwrap().is_empty());
    });
}
