use std::fmt;

/// Typed value used to build reuse keys.
///
/// Serialization is a pure function of the value: scalars stringify, lists join
/// their items with `,`, maps join `name=value` pairs with `|` in field order,
/// and `Unset` is the empty string.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum KeyValue {
    #[default]
    Unset,
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
    List(Vec<KeyValue>),
    Map(Vec<(String, KeyValue)>),
}

impl KeyValue {
    /// A map whose first field is `type=<kind>`.
    pub fn typed(kind: &str) -> Self {
        KeyValue::Map(vec![("type".to_owned(), KeyValue::Str(kind.to_owned()))])
    }

    /// Appends a field. No-op on anything but a map.
    pub fn with(mut self, name: &str, value: impl Into<KeyValue>) -> Self {
        if let KeyValue::Map(fields) = &mut self {
            fields.push((name.to_owned(), value.into()));
        }
        self
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        match self {
            KeyValue::Unset => {}
            KeyValue::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            KeyValue::Int(v) => out.push_str(&v.to_string()),
            KeyValue::Num(v) => out.push_str(&v.to_string()),
            KeyValue::Str(v) => out.push_str(v),
            KeyValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_to(out);
                }
            }
            KeyValue::Map(fields) => {
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push('|');
                    }
                    out.push_str(name);
                    out.push('=');
                    value.write_to(out);
                }
            }
        }
    }
}

impl From<bool> for KeyValue {
    fn from(v: bool) -> Self {
        KeyValue::Bool(v)
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<u32> for KeyValue {
    fn from(v: u32) -> Self {
        KeyValue::Int(i64::from(v))
    }
}

impl From<f32> for KeyValue {
    fn from(v: f32) -> Self {
        KeyValue::Num(f64::from(v))
    }
}

impl From<f64> for KeyValue {
    fn from(v: f64) -> Self {
        KeyValue::Num(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Str(v.to_owned())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Str(v)
    }
}

impl<T: Into<KeyValue>> From<Option<T>> for KeyValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(KeyValue::Unset, Into::into)
    }
}

impl<T: Into<KeyValue>> From<Vec<T>> for KeyValue {
    fn from(v: Vec<T>) -> Self {
        KeyValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Serialized reuse key. Sources with equal keys are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupKey(String);

impl LookupKey {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&KeyValue> for LookupKey {
    fn from(value: &KeyValue) -> Self {
        Self(value.serialize())
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
