//! Call descriptors: the opaque `{module, function, params}` payload handed
//! to the ledger.
//!
//! A call's identity is its SCALE encoding. Parameter order and numeric width
//! are part of the encoded bytes, so two descriptors that "mean" the same
//! transfer but list their parameters differently, or carry the amount as a
//! `U64` instead of a `U128`, have different call hashes.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Address, Hash, Hashable};

/// A parameter value inside a [`CallDescriptor`].
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    Bytes(Vec<u8>),
    Text(String),
    Account(Address),
    Hash(Hash),
    Call(Box<CallDescriptor>),
    Calls(Vec<CallDescriptor>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Optional(Option<Box<Value>>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Value::U128(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_account(&self) -> Option<Address> {
        match self {
            Value::Account(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<Hash> {
        match self {
            Value::Hash(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&CallDescriptor> {
        match self {
            Value::Call(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_calls(&self) -> Option<&[CallDescriptor]> {
        match self {
            Value::Calls(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(v) => Some(v),
            _ => None,
        }
    }

    /// `Some(None)` for an encoded `None`, `None` if this is not an optional.
    pub fn as_optional(&self) -> Option<Option<&Value>> {
        match self {
            Value::Optional(v) => Some(v.as_deref()),
            _ => None,
        }
    }

    /// A list whose every element is an account.
    pub fn as_accounts(&self) -> Option<Vec<Address>> {
        self.as_list()?.iter().map(Value::as_account).collect()
    }

    pub fn none() -> Self {
        Value::Optional(None)
    }

    pub fn some(value: impl Into<Value>) -> Self {
        Value::Optional(Some(Box::new(value.into())))
    }

    pub fn accounts<'a>(accounts: impl IntoIterator<Item = &'a Address>) -> Self {
        Value::List(accounts.into_iter().copied().map(Value::Account).collect())
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    u128 => U128,
    Vec<u8> => Bytes,
    String => Text,
    Address => Account,
    Hash => Hash,
    Vec<CallDescriptor> => Calls,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<CallDescriptor> for Value {
    fn from(v: CallDescriptor) -> Self {
        Value::Call(Box::new(v))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[impl fmt::Display]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }

        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}u8", v),
            Value::U16(v) => write!(f, "{}u16", v),
            Value::U32(v) => write!(f, "{}u32", v),
            Value::U64(v) => write!(f, "{}u64", v),
            Value::U128(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
            Value::Text(v) => write!(f, "{:?}", v),
            Value::Account(v) => write!(f, "{}", v),
            Value::Hash(v) => write!(f, "{}", v),
            Value::Call(v) => write!(f, "{}", v),
            Value::Calls(v) => {
                write!(f, "[")?;
                join(f, v)?;
                write!(f, "]")
            }
            Value::List(v) => {
                write!(f, "[")?;
                join(f, v)?;
                write!(f, "]")
            }
            Value::Tuple(v) => {
                write!(f, "(")?;
                join(f, v)?;
                write!(f, ")")
            }
            Value::Optional(None) => write!(f, "None"),
            Value::Optional(Some(v)) => write!(f, "Some({})", v),
        }
    }
}

/// An immutable ledger call: `module.function(params...)`.
///
/// Built with [`CallDescriptor::new`] and the consuming [`CallDescriptor::arg`]
/// builder; there are no setters once the value leaves the builder chain.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct CallDescriptor {
    module: String,
    function: String,
    params: Vec<(String, Value)>,
}

impl CallDescriptor {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(
        module: impl Into<String>,
        function: impl Into<String>,
        params: Vec<(String, Value)>,
    ) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            params,
        }
    }

    /// Append a named parameter. Order of calls is the encoded order.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    pub fn is(&self, module: &str, function: &str) -> bool {
        self.module == module && self.function == function
    }

    /// First parameter with the given name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Canonical encoded payload.
    pub fn encoded(&self) -> Vec<u8> {
        self.encode()
    }

    /// blake2-256 digest of the encoded payload; the multisig matching key.
    pub fn call_hash(&self) -> Hash {
        Hashable::hash(self)
    }
}

impl Hashable for CallDescriptor {}

impl fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.module, self.function)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, ")")
    }
}
