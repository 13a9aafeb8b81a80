//! Bidirectional conversion between host values and R objects.
//!
//! A [`Converter`] is a named bundle of conversion rules: R-to-host rules
//! keyed by the R type tag, host-to-R rules keyed by the host `TypeId`,
//! and per-type class maps that let an R object's dynamic `class`
//! attribute pick a more specific rule. Converters compose with `+`
//! (right side wins) and activate either process-wide
//! ([`set_default_converter`]) or for a lexical scope on the current
//! thread ([`local_converter`]).

use crate::error::{LinkError, LinkResult};
use crate::object::RObject;
use crate::vector::{
    ComplexVector, IntVector, ListVector, LogicalVector, PairList, RawVector, RealVector,
    StrVector, Symbol,
};
use parking_lot::RwLock;
use rlink_libr::SexpType;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Host-side representation of an R value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(Vec<Option<bool>>),
    Int(Vec<Option<i32>>),
    Real(Vec<Option<f64>>),
    Complex(Vec<Option<(f64, f64)>>),
    Raw(Vec<u8>),
    Str(Vec<Option<String>>),
    List(Vec<Value>),
    Named(Vec<(Option<String>, Value)>),
    /// Result of a class-mapped rule: the matched class name plus the
    /// object's converted fields.
    Custom {
        class: String,
        fields: Vec<(Option<String>, Value)>,
    },
}

/// An R-to-host rule.
pub type ToHostFn = Arc<dyn Fn(&RObject, &Converter) -> LinkResult<Value> + Send + Sync>;

/// A host-to-R rule over a type-erased host value.
pub type ToForeignFn = Arc<dyn Fn(&dyn Any, &Converter) -> LinkResult<RObject> + Send + Sync>;

/// A class-map factory, chosen by dynamic class name.
pub type ClassFactory = Arc<dyn Fn(&RObject, &Converter) -> LinkResult<Value> + Send + Sync>;

/// A named, composable bundle of conversion rules.
#[derive(Clone, Default)]
pub struct Converter {
    name: String,
    to_host: HashMap<SexpType, ToHostFn>,
    to_foreign: HashMap<TypeId, ToForeignFn>,
    class_map: HashMap<SexpType, BTreeMap<String, ClassFactory>>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("name", &self.name)
            .field("to_host_rules", &self.to_host.len())
            .field("to_foreign_rules", &self.to_foreign.len())
            .field("class_maps", &self.class_map.len())
            .finish()
    }
}

impl Converter {
    /// The identity converter: no rules of any kind.
    pub fn empty(name: &str) -> Self {
        Converter {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register an R-to-host rule for one type tag.
    pub fn register_to_host(
        &mut self,
        kind: SexpType,
        rule: impl Fn(&RObject, &Converter) -> LinkResult<Value> + Send + Sync + 'static,
    ) {
        self.to_host.insert(kind, Arc::new(rule));
    }

    /// Register a host-to-R rule for the host type `T`.
    pub fn register_to_foreign<T: Any>(
        &mut self,
        rule: impl Fn(&T, &Converter) -> LinkResult<RObject> + Send + Sync + 'static,
    ) {
        let erased: ToForeignFn = Arc::new(move |value, conv| {
            // The table is keyed by TypeId, so the downcast cannot fail.
            match value.downcast_ref::<T>() {
                Some(value) => rule(value, conv),
                None => Err(LinkError::Conversion(
                    "host value does not match its registered type".to_string(),
                )),
            }
        });
        self.to_foreign.insert(TypeId::of::<T>(), erased);
    }

    /// Register a class-mapped rule: when an object of `kind` carries
    /// `class_name` in its class vector, `factory` converts it instead of
    /// the type's base rule.
    pub fn register_class(
        &mut self,
        kind: SexpType,
        class_name: &str,
        factory: impl Fn(&RObject, &Converter) -> LinkResult<Value> + Send + Sync + 'static,
    ) {
        self.class_map
            .entry(kind)
            .or_default()
            .insert(class_name.to_string(), Arc::new(factory));
    }

    /// Convert an R object to a host value.
    ///
    /// Dispatch order: the object's dynamic class vector is scanned most
    /// specific first against this type's class map; the first hit wins.
    /// With no hit the base rule for the type tag applies.
    pub fn to_host(&self, obj: &RObject) -> LinkResult<Value> {
        let kind = obj.sexp_type();
        if let Some(map) = self.class_map.get(&kind)
            && !map.is_empty()
        {
            for class in obj.class_names()? {
                if let Some(factory) = map.get(&class) {
                    return factory(obj, self);
                }
            }
        }
        match self.to_host.get(&kind) {
            Some(rule) => rule(obj, self),
            // A missing rule is distinct from a rule that failed on an
            // element; callers match on ConversionMissing to fall back.
            None => Err(LinkError::ConversionMissing {
                type_name: format!("{:?}", kind),
            }),
        }
    }

    /// Convert a host value to an R object.
    ///
    /// Dispatch is on the static type `T`; a missing rule reports the
    /// host type's name.
    pub fn to_foreign<T: Any>(&self, value: &T) -> LinkResult<RObject> {
        match self.to_foreign.get(&TypeId::of::<T>()) {
            Some(rule) => rule(value, self),
            None => Err(LinkError::ConversionMissing {
                type_name: std::any::type_name::<T>().to_string(),
            }),
        }
    }
}

/// Overlay composition: every rule of `rhs` is laid over `lhs`, so the
/// right operand wins on conflicts and class maps merge key by key.
impl std::ops::Add<&Converter> for &Converter {
    type Output = Converter;

    fn add(self, rhs: &Converter) -> Converter {
        let mut out = self.clone();
        out.name = if self.name.is_empty() {
            rhs.name.clone()
        } else if rhs.name.is_empty() {
            self.name.clone()
        } else {
            format!("{}+{}", self.name, rhs.name)
        };
        for (kind, rule) in &rhs.to_host {
            out.to_host.insert(*kind, Arc::clone(rule));
        }
        for (type_id, rule) in &rhs.to_foreign {
            out.to_foreign.insert(*type_id, Arc::clone(rule));
        }
        for (kind, map) in &rhs.class_map {
            let target = out.class_map.entry(*kind).or_default();
            for (class, factory) in map {
                target.insert(class.clone(), Arc::clone(factory));
            }
        }
        out
    }
}

static DEFAULT_CONVERTER: RwLock<Option<Arc<Converter>>> = RwLock::new(None);

thread_local! {
    static CONVERTER_STACK: RefCell<Vec<Arc<Converter>>> = const { RefCell::new(Vec::new()) };
}

/// Install the process-wide default converter.
pub fn set_default_converter(converter: Converter) {
    *DEFAULT_CONVERTER.write() = Some(Arc::new(converter));
}

/// The converter governing the current execution context: the top of the
/// thread's local stack, else the process default.
pub fn current_converter() -> LinkResult<Arc<Converter>> {
    let local = CONVERTER_STACK.with(|stack| stack.borrow().last().cloned());
    if let Some(conv) = local {
        return Ok(conv);
    }
    DEFAULT_CONVERTER
        .read()
        .clone()
        .ok_or(LinkError::NoConverter)
}

/// RAII guard for a scoped converter; pops its stack entry on drop.
#[derive(Debug)]
pub struct ConverterGuard {
    depth: usize,
}

impl Drop for ConverterGuard {
    fn drop(&mut self) {
        CONVERTER_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            // Guards are scope-bound, so drops are strictly LIFO.
            debug_assert_eq!(stack.len(), self.depth);
            stack.pop();
        });
    }
}

/// Activate `converter` for the current thread until the returned guard
/// drops. Nesting stacks; unwinding restores the previous converter.
pub fn local_converter(converter: Converter) -> ConverterGuard {
    let depth = CONVERTER_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(Arc::new(converter));
        stack.len()
    });
    ConverterGuard { depth }
}

/// The base rule set: every vector kind the typed hierarchy exposes maps
/// to its obvious host representation, and the common host types map
/// back.
pub fn default_converter() -> Converter {
    let mut conv = Converter::empty("default");

    conv.register_to_host(SexpType::NilSxp, |_, _| Ok(Value::Null));
    conv.register_to_host(SexpType::LglSxp, |obj, _| {
        Ok(Value::Bool(LogicalVector::from_object(obj.clone())?.to_vec()?))
    });
    conv.register_to_host(SexpType::IntSxp, |obj, _| {
        Ok(Value::Int(IntVector::from_object(obj.clone())?.to_vec()?))
    });
    conv.register_to_host(SexpType::RealSxp, |obj, _| {
        Ok(Value::Real(RealVector::from_object(obj.clone())?.to_vec()?))
    });
    conv.register_to_host(SexpType::CplxSxp, |obj, _| {
        Ok(Value::Complex(
            ComplexVector::from_object(obj.clone())?.to_vec()?,
        ))
    });
    conv.register_to_host(SexpType::RawSxp, |obj, _| {
        Ok(Value::Raw(RawVector::from_object(obj.clone())?.to_vec()?))
    });
    conv.register_to_host(SexpType::StrSxp, |obj, _| {
        Ok(Value::Str(StrVector::from_object(obj.clone())?.to_vec()?))
    });
    conv.register_to_host(SexpType::SymSxp, |obj, _| {
        let name = Symbol::from_object(obj.clone())?.name()?;
        Ok(Value::Str(vec![Some(name)]))
    });
    conv.register_to_host(SexpType::VecSxp, |obj, conv| {
        let list = ListVector::from_object(obj.clone())?;
        let names = list.names()?;
        let elements = list.to_vec()?;
        let any_named = names.iter().any(Option::is_some);
        if any_named {
            let mut out = Vec::with_capacity(elements.len());
            for (name, element) in names.into_iter().zip(elements) {
                out.push((name, conv.to_host(&element)?));
            }
            Ok(Value::Named(out))
        } else {
            let mut out = Vec::with_capacity(elements.len());
            for element in elements {
                out.push(conv.to_host(&element)?);
            }
            Ok(Value::List(out))
        }
    });
    conv.register_to_host(SexpType::ListSxp, |obj, conv| {
        let pairs = PairList::from_object(obj.clone())?.pairs()?;
        let mut out = Vec::with_capacity(pairs.len());
        for (name, element) in pairs {
            out.push((name, conv.to_host(&element)?));
        }
        Ok(Value::Named(out))
    });

    conv.register_to_foreign::<bool>(|value, _| {
        Ok(LogicalVector::from_slice(&[Some(*value)])?.into_object())
    });
    conv.register_to_foreign::<i32>(|value, _| {
        Ok(IntVector::from_slice(&[Some(*value)])?.into_object())
    });
    conv.register_to_foreign::<f64>(|value, _| {
        Ok(RealVector::from_slice(&[Some(*value)])?.into_object())
    });
    conv.register_to_foreign::<String>(|value, _| {
        Ok(StrVector::from_slice(&[Some(value.as_str())])?.into_object())
    });
    conv.register_to_foreign::<&'static str>(|value, _| {
        Ok(StrVector::from_slice(&[Some(*value)])?.into_object())
    });
    conv.register_to_foreign::<Vec<Option<bool>>>(|value, _| {
        Ok(LogicalVector::from_slice(value)?.into_object())
    });
    conv.register_to_foreign::<Vec<Option<i32>>>(|value, _| {
        Ok(IntVector::from_slice(value)?.into_object())
    });
    conv.register_to_foreign::<Vec<Option<f64>>>(|value, _| {
        Ok(RealVector::from_slice(value)?.into_object())
    });
    conv.register_to_foreign::<Vec<Option<String>>>(|value, _| {
        Ok(StrVector::from_slice(value)?.into_object())
    });
    conv.register_to_foreign::<Vec<u8>>(|value, _| {
        Ok(RawVector::from_slice(value)?.into_object())
    });
    conv.register_to_foreign::<Value>(|value, conv| value_to_foreign(value, conv));

    conv
}

/// Materialize a host [`Value`] as an R object.
pub fn value_to_foreign(value: &Value, conv: &Converter) -> LinkResult<RObject> {
    match value {
        Value::Null => {
            let nil = rlink_libr::r_nil_value()?;
            unsafe { RObject::new(nil) }
        }
        Value::Bool(v) => Ok(LogicalVector::from_slice(v)?.into_object()),
        Value::Int(v) => Ok(IntVector::from_slice(v)?.into_object()),
        Value::Real(v) => Ok(RealVector::from_slice(v)?.into_object()),
        Value::Complex(v) => Ok(ComplexVector::from_slice(v)?.into_object()),
        Value::Raw(v) => Ok(RawVector::from_slice(v)?.into_object()),
        Value::Str(v) => Ok(StrVector::from_slice(v)?.into_object()),
        Value::List(v) => {
            let mut elements = Vec::with_capacity(v.len());
            for element in v {
                elements.push(value_to_foreign(element, conv)?);
            }
            Ok(ListVector::from_objects(&elements)?.into_object())
        }
        Value::Named(pairs) => named_to_foreign(pairs, conv),
        Value::Custom { class, fields } => {
            let obj = named_to_foreign(fields, conv)?;
            let class_attr = StrVector::from_slice(&[Some(class.as_str())])?;
            obj.set_attribute("class", class_attr.object())?;
            Ok(obj)
        }
    }
}

fn named_to_foreign(pairs: &[(Option<String>, Value)], conv: &Converter) -> LinkResult<RObject> {
    let mut elements = Vec::with_capacity(pairs.len());
    let mut names = Vec::with_capacity(pairs.len());
    for (name, element) in pairs {
        elements.push(value_to_foreign(element, conv)?);
        names.push(name.as_deref().map(str::to_string));
    }
    let list = ListVector::from_objects(&elements)?;
    if names.iter().any(Option::is_some) {
        let name_strs: Vec<Option<&str>> = names
            .iter()
            .map(|n| Some(n.as_deref().unwrap_or("")))
            .collect();
        let names_vec = StrVector::from_slice(&name_strs)?;
        list.object().set_attribute("names", names_vec.object())?;
    }
    Ok(list.into_object())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::RHandle;
    use rlink_libr::SEXP;

    // Rules registered here never touch R, so dispatch and composition
    // are testable on fabricated handles.

    fn fake_object(addr: usize, kind: SexpType) -> RObject {
        unsafe { RObject::from_handle(RHandle::new(addr as SEXP, kind)) }
    }

    fn tagged(name: &str, tag: i32) -> Converter {
        let mut conv = Converter::empty(name);
        conv.register_to_host(SexpType::IntSxp, move |_, _| Ok(Value::Int(vec![Some(tag)])));
        conv
    }

    #[test]
    fn empty_converter_has_no_rules() {
        // A missing rule is ConversionMissing in both directions, naming
        // the R tag or the host type so callers can fall back.
        let conv = Converter::empty("none");
        let obj = fake_object(0x21000, SexpType::IntSxp);
        match conv.to_host(&obj) {
            Err(LinkError::ConversionMissing { type_name }) => {
                assert_eq!(type_name, "IntSxp");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        match conv.to_foreign(&5i32) {
            Err(LinkError::ConversionMissing { type_name }) => {
                assert_eq!(type_name, "i32");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn composition_with_empty_is_identity() {
        let base = tagged("base", 1);
        let obj = fake_object(0x22000, SexpType::IntSxp);

        let left = &Converter::empty("") + &base;
        let right = &base + &Converter::empty("");
        assert_eq!(left.to_host(&obj).unwrap(), Value::Int(vec![Some(1)]));
        assert_eq!(right.to_host(&obj).unwrap(), Value::Int(vec![Some(1)]));
        assert_eq!(left.name(), "base");
        assert_eq!(right.name(), "base");
    }

    #[test]
    fn composition_right_operand_wins() {
        let a = tagged("a", 1);
        let b = tagged("b", 2);
        let obj = fake_object(0x23000, SexpType::IntSxp);

        let ab = &a + &b;
        assert_eq!(ab.to_host(&obj).unwrap(), Value::Int(vec![Some(2)]));
        assert_eq!(ab.name(), "a+b");

        let ba = &b + &a;
        assert_eq!(ba.to_host(&obj).unwrap(), Value::Int(vec![Some(1)]));
    }

    #[test]
    fn composition_is_associative() {
        let a = tagged("a", 1);
        let b = tagged("b", 2);
        let mut c = Converter::empty("c");
        c.register_to_host(SexpType::RealSxp, |_, _| Ok(Value::Real(vec![Some(3.0)])));

        let left = &(&a + &b) + &c;
        let right = &a + &(&b + &c);

        let int_obj = fake_object(0x24000, SexpType::IntSxp);
        let real_obj = fake_object(0x24100, SexpType::RealSxp);
        assert_eq!(
            left.to_host(&int_obj).unwrap(),
            right.to_host(&int_obj).unwrap()
        );
        assert_eq!(
            left.to_host(&real_obj).unwrap(),
            right.to_host(&real_obj).unwrap()
        );
    }

    #[test]
    fn missing_to_foreign_rule_names_the_host_type() {
        struct Widget;
        let conv = Converter::empty("none");
        let err = conv.to_foreign(&Widget).unwrap_err();
        match err {
            LinkError::ConversionMissing { type_name } => {
                assert!(type_name.contains("Widget"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn to_foreign_dispatches_on_static_type() {
        let mut conv = Converter::empty("marker");
        conv.register_to_foreign::<u64>(|value, _| {
            Ok(fake_object(0x25000 + *value as usize, SexpType::IntSxp))
        });
        let obj = conv.to_foreign(&7u64).unwrap();
        assert_eq!(obj.addr(), 0x25007);
        // A different host type still misses
        assert!(conv.to_foreign(&7u32).is_err());
    }

    #[test]
    fn local_converter_stacks_and_restores() {
        let obj = fake_object(0x26000, SexpType::IntSxp);
        set_default_converter(tagged("default", 0));

        assert_eq!(
            current_converter().unwrap().to_host(&obj).unwrap(),
            Value::Int(vec![Some(0)])
        );
        {
            let _outer = local_converter(tagged("outer", 1));
            assert_eq!(
                current_converter().unwrap().to_host(&obj).unwrap(),
                Value::Int(vec![Some(1)])
            );
            {
                let _inner = local_converter(tagged("inner", 2));
                assert_eq!(
                    current_converter().unwrap().to_host(&obj).unwrap(),
                    Value::Int(vec![Some(2)])
                );
            }
            assert_eq!(
                current_converter().unwrap().to_host(&obj).unwrap(),
                Value::Int(vec![Some(1)])
            );
        }
        assert_eq!(
            current_converter().unwrap().to_host(&obj).unwrap(),
            Value::Int(vec![Some(0)])
        );
    }

    #[test]
    fn local_converter_restores_across_a_panic() {
        let obj = fake_object(0x27000, SexpType::IntSxp);
        let _outer = local_converter(tagged("outer", 10));

        let result = std::panic::catch_unwind(|| {
            let _inner = local_converter(tagged("inner", 11));
            panic!("boom");
        });
        assert!(result.is_err());

        assert_eq!(
            current_converter().unwrap().to_host(&obj).unwrap(),
            Value::Int(vec![Some(10)])
        );
    }

    #[test]
    fn scoped_converter_is_thread_local() {
        let _guard = local_converter(tagged("main-thread", 1));
        // No guard on the spawned thread, and no reliance on the default
        // converter slot (another test may have set it to anything).
        std::thread::spawn(|| {
            CONVERTER_STACK.with(|stack| assert!(stack.borrow().is_empty()));
        })
        .join()
        .unwrap();
    }
}
