//! Construct-by-name capability
//!
//! Rewritten construction sites call a process-wide factory with a binary
//! type name, the constructor's parameter types and the argument values.
//! The factory resolves the name at call time, so construction follows
//! whichever generation is active.

use crate::error::ConstructError;
use crate::runtime::LoadedType;
use hotswap_bytecode::{JavaType, Primitive};
use std::sync::Arc;

/// Argument or result value crossing the factory boundary
#[derive(Debug, Clone)]
pub enum Value {
    /// Null reference
    Null,
    /// Any int-like primitive
    Int(i32),
    /// Long
    Long(i64),
    /// Float
    Float(f32),
    /// Double
    Double(f64),
    /// String reference
    Str(String),
    /// Constructed object
    Object(Arc<Instance>),
}

impl Value {
    /// True if the value can be passed for a parameter of type `ty`
    #[must_use]
    pub fn fits(&self, ty: &JavaType) -> bool {
        match (ty.as_primitive(), self) {
            (Some(Primitive::Long), Value::Long(_))
            | (Some(Primitive::Float), Value::Float(_))
            | (Some(Primitive::Double), Value::Double(_))
            | (None, Value::Null | Value::Str(_) | Value::Object(_)) => true,
            (Some(p), Value::Int(_)) => !matches!(p, Primitive::Long | Primitive::Float | Primitive::Double),
            _ => false,
        }
    }
}

/// Object produced by a factory
#[derive(Debug)]
pub struct Instance {
    /// Type the object was constructed as
    pub ty: Arc<LoadedType>,
    /// Constructor descriptor used
    pub ctor_desc: String,
    /// Constructor arguments
    pub args: Vec<Value>,
}

impl Instance {
    /// Internal name of the instance's type
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.ty.internal_name()
    }
}

/// Constructor descriptor for a parameter list
#[must_use]
pub fn constructor_descriptor(types: &[JavaType]) -> String {
    let params: String = types.iter().map(ToString::to_string).collect();
    format!("({params})V")
}

/// Construct an object by binary name
pub trait ObjectFactory: Send + Sync {
    /// Build an instance of `name` (binary form) with the constructor whose
    /// parameters are `types`
    ///
    /// # Errors
    /// Returns error if the name does not resolve, no constructor matches,
    /// or the values do not fit the parameters
    fn construct(&self, name: &str, types: &[JavaType], values: Vec<Value>) -> Result<Instance, ConstructError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_matches_slot_kinds() {
        let int = JavaType::Primitive(Primitive::Int);
        let boolean = JavaType::Primitive(Primitive::Boolean);
        let long = JavaType::Primitive(Primitive::Long);
        let string = JavaType::object("java/lang/String");

        assert!(Value::Int(1).fits(&int));
        assert!(Value::Int(1).fits(&boolean));
        assert!(!Value::Int(1).fits(&long));
        assert!(Value::Long(1).fits(&long));
        assert!(Value::Null.fits(&string));
        assert!(!Value::Null.fits(&int));
    }

    #[test]
    fn descriptor_from_types() {
        let types = [
            JavaType::Primitive(Primitive::Int),
            JavaType::object("java/lang/String"),
        ];
        assert_eq!(constructor_descriptor(&types), "(ILjava/lang/String;)V");
        assert_eq!(constructor_descriptor(&[]), "()V");
    }
}
