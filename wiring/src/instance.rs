use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::CallError;

/// A live service object of any registered type.
///
/// Cloning an instance clones the handle, not the object.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Instance {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Wraps an already shared object. Post-construction methods cannot run
    /// on such an instance while other handles to it exist.
    pub fn from_arc<T>(value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            value,
            type_name: type_name::<T>(),
        }
    }

    /// Identifier of the wrapped object's concrete type.
    pub fn type_id(&self) -> TypeId {
        (*self.value).type_id()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T>(&self) -> bool
    where
        T: Any,
    {
        self.value.is::<T>()
    }

    pub fn downcast<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: Any,
    {
        self.value.downcast_ref::<T>()
    }

    /// Returns `true` if both handles point at the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    pub(crate) fn get_mut(&mut self) -> Option<&mut (dyn Any + Send + Sync)> {
        Arc::get_mut(&mut self.value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A resolved argument: either a plain value or another service.
#[derive(Debug, Clone)]
pub enum Value {
    Literal(JsonValue),
    Service(Instance),
}

impl Value {
    fn describe(&self) -> String {
        match self {
            Value::Literal(v) => format!("literal {v}"),
            Value::Service(v) => format!("service of type {}", v.type_name()),
        }
    }
}

/// Conversion from a resolved argument into a parameter type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, String>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl FromValue for JsonValue {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Literal(v) => Ok(v),
            other => Err(format!("expected a literal, got {}", other.describe())),
        }
    }
}

impl FromValue for Instance {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Service(v) => Ok(v),
            other => Err(format!("expected a service, got {}", other.describe())),
        }
    }
}

impl<T> FromValue for Arc<T>
where
    T: Any + Send + Sync,
{
    fn from_value(value: Value) -> Result<Self, String> {
        let instance = Instance::from_value(value)?;
        instance.downcast::<T>().ok_or_else(|| {
            format!(
                "expected service of type {}, got {}",
                type_name::<T>(),
                instance.type_name()
            )
        })
    }
}

impl<T> FromValue for Option<T>
where
    T: FromValue,
{
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Literal(JsonValue::Null) => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T> FromValue for Vec<T>
where
    T: FromValue,
{
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Literal(JsonValue::Array(items)) => items
                .into_iter()
                .map(|v| T::from_value(Value::Literal(v)))
                .collect(),
            other => Err(format!("expected a list, got {}", other.describe())),
        }
    }
}

/// Parameter wrapper deserializing a literal into any `serde` type.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T> FromValue for Json<T>
where
    T: DeserializeOwned,
{
    fn from_value(value: Value) -> Result<Self, String> {
        deserialize(value).map(Json)
    }
}

fn deserialize<T>(value: Value) -> Result<T, String>
where
    T: DeserializeOwned,
{
    match value {
        Value::Literal(v) => serde_json::from_value(v).map_err(|e| e.to_string()),
        other => Err(format!(
            "expected a literal {}, got {}",
            type_name::<T>(),
            other.describe()
        )),
    }
}

macro_rules! impl_from_value_literal {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, String> {
                    deserialize(value)
                }
            }
        )*
    };
}

impl_from_value_literal!(
    String, bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
);

/// Resolved arguments handed to a constructor, factory or method.
pub struct Args {
    values: std::vec::IntoIter<Value>,
    len: usize,
    position: usize,
}

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            len: values.len(),
            values: values.into_iter(),
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fails unless exactly `count` arguments were supplied.
    pub fn expect(&self, count: usize) -> Result<(), CallError> {
        if self.len != count {
            return Err(CallError::Arity {
                expected: count,
                actual: self.len,
            });
        }
        Ok(())
    }

    /// Converts the next argument.
    pub fn next<T>(&mut self) -> Result<T, CallError>
    where
        T: FromValue,
    {
        let index = self.position;
        let value = self.values.next().ok_or(CallError::Arity {
            expected: index + 1,
            actual: self.len,
        })?;
        self.position += 1;
        T::from_value(value).map_err(|reason| CallError::Argument { index, reason })
    }

    /// Takes every argument not consumed yet.
    pub fn rest(&mut self) -> Vec<Value> {
        self.position = self.len;
        self.values.by_ref().collect()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Smtp {
        host: String,
        port: u16,
    }

    #[test]
    fn test_args_conversion() {
        let session = Instance::new(String::from("native"));
        let mut args = Args::new(vec![
            Value::Literal(json!("user")),
            Value::Literal(json!(25)),
            Value::Literal(json!(null)),
            Value::Service(session.clone()),
            Value::Literal(json!({"host": "localhost", "port": 25})),
        ]);
        args.expect(5).unwrap();
        assert_eq!(args.next::<String>().unwrap(), "user");
        assert_eq!(args.next::<u16>().unwrap(), 25);
        assert_eq!(args.next::<Option<bool>>().unwrap(), None);
        assert_eq!(args.next::<Arc<String>>().unwrap().as_str(), "native");
        assert_eq!(
            args.next::<Json<Smtp>>().unwrap().0,
            Smtp {
                host: "localhost".into(),
                port: 25
            }
        );
        assert!(matches!(
            args.next::<String>(),
            Err(CallError::Arity {
                expected: 6,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_args_mismatch() {
        let mut args = Args::new(vec![
            Value::Literal(json!("x")),
            Value::Service(Instance::new(1u8)),
        ]);
        assert!(matches!(args.expect(1), Err(CallError::Arity { .. })));
        assert!(matches!(
            args.next::<Instance>(),
            Err(CallError::Argument { index: 0, .. })
        ));
        assert!(matches!(
            args.next::<Arc<String>>(),
            Err(CallError::Argument { index: 1, .. })
        ));
    }

    #[test]
    fn test_instance_identity() {
        let a = Instance::new(vec![1, 2, 3]);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Instance::new(vec![1, 2, 3])));
        assert_eq!(a.type_id(), TypeId::of::<Vec<i32>>());
        assert!(a.is::<Vec<i32>>());
        assert_eq!(a.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
        assert!(a.downcast::<String>().is_none());
    }
}
