//! Typed operation handlers.
//!
//! Any `Fn(&T, A1, .., An) -> R` with deserializable arguments and an
//! [`IntoOutcome`] return type can be registered as an operation. Arguments
//! are decoded positionally from the invocation's `v` array.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, TetherError};

/// What an operation produced: its return values, or a call-level error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Values(Vec<Value>),
    Failed(String),
}

/// Conversion of an operation's return type into an [`Outcome`].
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

fn single<T: Serialize>(value: T) -> Outcome {
    match serde_json::to_value(value) {
        Ok(v) => Outcome::Values(vec![v]),
        Err(e) => Outcome::Failed(format!("Failed to encode result: {}", e)),
    }
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome {
        Outcome::Values(Vec::new())
    }
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Outcome {
        self
    }
}

macro_rules! single_outcome {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOutcome for $ty {
                fn into_outcome(self) -> Outcome {
                    single(self)
                }
            }
        )*
    };
}

single_outcome!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String, &'static str,
    Value,
);

impl<T: Serialize> IntoOutcome for Vec<T> {
    fn into_outcome(self) -> Outcome {
        single(self)
    }
}

impl<T: Serialize> IntoOutcome for Option<T> {
    fn into_outcome(self) -> Outcome {
        single(self)
    }
}

impl<K: Serialize + Ord, V: Serialize> IntoOutcome for BTreeMap<K, V> {
    fn into_outcome(self) -> Outcome {
        single(self)
    }
}

impl<K: Serialize + Eq + std::hash::Hash, V: Serialize> IntoOutcome for HashMap<K, V> {
    fn into_outcome(self) -> Outcome {
        single(self)
    }
}

/// Wraps any serializable value returned as a single result.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoOutcome for Json<T> {
    fn into_outcome(self) -> Outcome {
        single(self.0)
    }
}

macro_rules! tuple_outcome {
    ($($name:ident),+) => {
        impl<$($name: Serialize),+> IntoOutcome for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_outcome(self) -> Outcome {
                let ($($name,)+) = self;
                let mut values = Vec::new();
                $(
                    match serde_json::to_value($name) {
                        Ok(v) => values.push(v),
                        Err(e) => {
                            return Outcome::Failed(format!("Failed to encode result: {}", e));
                        }
                    }
                )+
                Outcome::Values(values)
            }
        }
    };
}

tuple_outcome!(A, B);
tuple_outcome!(A, B, C);
tuple_outcome!(A, B, C, D);
tuple_outcome!(A, B, C, D, E);
tuple_outcome!(A, B, C, D, E, F);

/// Trailing error convention: `Err` suppresses every other result.
impl<R: IntoOutcome, E: Display> IntoOutcome for std::result::Result<R, E> {
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(r) => r.into_outcome(),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

/// A callable operation on a receiver of type `T`.
///
/// `Args` is a marker tuple of the argument types so that one closure type
/// can only satisfy one arity.
pub trait Handler<T, Args>: Send + Sync + 'static {
    fn arity(&self) -> usize;

    fn call(&self, target: &T, name: &str, args: &[Value]) -> Result<Outcome>;
}

fn decode_arg<A: DeserializeOwned>(name: &str, index: usize, value: &Value) -> Result<A> {
    A::deserialize(value).map_err(|source| TetherError::ArgumentDecode {
        name: name.to_string(),
        index,
        source,
    })
}

macro_rules! count {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count!($($tail)*) };
}

macro_rules! impl_handler {
    ($($arg:ident),*) => {
        impl<T, F, R, $($arg,)*> Handler<T, ($($arg,)*)> for F
        where
            F: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            R: IntoOutcome,
            $($arg: DeserializeOwned,)*
        {
            fn arity(&self) -> usize {
                count!($($arg)*)
            }

            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn call(&self, target: &T, name: &str, args: &[Value]) -> Result<Outcome> {
                let expected = count!($($arg)*);
                let mut values = args.iter().enumerate();
                $(
                    let $arg: $arg = match values.next() {
                        Some((index, value)) => decode_arg(name, index, value)?,
                        None => {
                            return Err(TetherError::ArityMismatch {
                                name: name.to_string(),
                                expected,
                                actual: args.len(),
                            });
                        }
                    };
                )*
                Ok((self)(target, $($arg),*).into_outcome())
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);
impl_handler!(A1, A2, A3, A4, A5);
impl_handler!(A1, A2, A3, A4, A5, A6);
impl_handler!(A1, A2, A3, A4, A5, A6, A7);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Object-safe view of a registered handler.
pub(crate) trait ErasedOperation<T>: Send + Sync {
    fn arity(&self) -> usize;

    fn call(&self, target: &T, name: &str, args: &[Value]) -> Result<Outcome>;
}

struct Erased<H, Args> {
    handler: H,
    _args: PhantomData<fn() -> Args>,
}

impl<T, H, Args> ErasedOperation<T> for Erased<H, Args>
where
    H: Handler<T, Args>,
    Args: 'static,
{
    fn arity(&self) -> usize {
        self.handler.arity()
    }

    fn call(&self, target: &T, name: &str, args: &[Value]) -> Result<Outcome> {
        self.handler.call(target, name, args)
    }
}

pub(crate) type Operation<T> = Arc<dyn ErasedOperation<T>>;

pub(crate) fn erase<T, H, Args>(handler: H) -> Operation<T>
where
    T: 'static,
    H: Handler<T, Args>,
    Args: 'static,
{
    Arc::new(Erased {
        handler,
        _args: PhantomData,
    })
}
