use crate::ast::FunctionLiteral;
use crate::evaluator::CallContext;
use crate::scope::Scope;
use chrono::{DateTime, SecondsFormat, Utc};
use rustc_hash::{FxHashMap, FxHasher};
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;
use std::thread::LocalKey;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    DateTime(DateTime<Utc>),
    /// Arrays and hashes are shared: every alias sees mutations.
    Array(Rc<RefCell<Vec<Value>>>),
    Hash(Rc<RefCell<HashValue>>),
    Function(Rc<FunctionValue>),
    Builtin(Rc<BuiltinFunction>),
    File(Rc<FileValue>),
    /// Result of a `return` that reached the top level.
    Return(Box<Value>),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn hash(hash: HashValue) -> Self {
        Value::Hash(Rc::new(RefCell::new(hash)))
    }

    /// A hash with string keys, in the order given.
    pub fn hash_from<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut hash = HashValue::new();
        for (key, value) in pairs {
            hash.insert_str(key, value);
        }
        Value::hash(hash)
    }

    pub fn file(file: FileValue) -> Self {
        Value::File(Rc::new(file))
    }

    /// Only `false` and null are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Boolean(false))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
            Value::Hash(_) => "hash",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::File(_) => "file",
            Value::Return(_) => "return",
        }
    }

    /// The key this value files under in a hash, for the kinds that can be keys.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::String(s) => Some(s.as_str().hash_key()),
            Value::Integer(n) => Some(n.hash_key()),
            Value::File(file) => Some(file.hash_key()),
            _ => None,
        }
    }
}

type ActiveSet = RefCell<Vec<usize>>;

thread_local! {
    // Addresses of the containers currently being printed or compared. A
    // container that holds itself is cut short on the second visit.
    static FORMATTING: ActiveSet = const { RefCell::new(Vec::new()) };
    static COMPARING: ActiveSet = const { RefCell::new(Vec::new()) };
}

struct Visit {
    active: &'static LocalKey<ActiveSet>,
}

impl Visit {
    fn enter<T>(active: &'static LocalKey<ActiveSet>, container: &Rc<T>) -> Option<Visit> {
        let address = Rc::as_ptr(container) as usize;
        active.with(|set| {
            let mut set = set.borrow_mut();
            if set.contains(&address) {
                return None;
            }
            set.push(address);
            Some(Visit { active })
        })
    }
}

impl Drop for Visit {
    fn drop(&mut self) {
        self.active.with(|set| {
            set.borrow_mut().pop();
        });
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(l), Value::Boolean(r)) => l == r,
            (Value::Integer(l), Value::Integer(r)) => l == r,
            (Value::Decimal(l), Value::Decimal(r)) => l == r,
            (Value::String(l), Value::String(r)) => l == r,
            (Value::DateTime(l), Value::DateTime(r)) => l == r,
            (Value::Array(l), Value::Array(r)) => {
                if Rc::ptr_eq(l, r) {
                    return true;
                }
                match Visit::enter(&COMPARING, l) {
                    Some(_visit) => *l.borrow() == *r.borrow(),
                    // Already comparing `l` further up: equal so far.
                    None => true,
                }
            }
            (Value::Hash(l), Value::Hash(r)) => {
                if Rc::ptr_eq(l, r) {
                    return true;
                }
                match Visit::enter(&COMPARING, l) {
                    Some(_visit) => *l.borrow() == *r.borrow(),
                    None => true,
                }
            }
            (Value::Function(l), Value::Function(r)) => l == r,
            (Value::Builtin(l), Value::Builtin(r)) => l == r,
            (Value::File(l), Value::File(r)) => l == r,
            (Value::Return(l), Value::Return(r)) => l == r,
            _ => false,
        }
    }
}

fn write_separated<T: fmt::Display>(
    f: &mut fmt::Formatter,
    items: impl IntoIterator<Item = T>,
) -> fmt::Result {
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Decimal(n) => {
                // Always show at least one decimal place for decimals
                if n.fract() == 0.0 {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Array(elements) => match Visit::enter(&FORMATTING, elements) {
                Some(_visit) => {
                    write!(f, "[")?;
                    write_separated(f, elements.borrow().iter())?;
                    write!(f, "]")
                }
                None => write!(f, "[...]"),
            },
            Value::Hash(hash) => match Visit::enter(&FORMATTING, hash) {
                Some(_visit) => write!(f, "{}", hash.borrow()),
                None => write!(f, "{{...}}"),
            },
            Value::Function(function) => write!(f, "{}", function),
            Value::Builtin(builtin) => write!(f, "builtin {}", builtin.name),
            Value::File(file) => write!(f, "{}", file),
            Value::Return(inner) => write!(f, "{}", inner),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    Integer,
    String,
    File,
}

/// Bucket identity of a hash key: its kind plus a 64-bit digest. Keys of
/// different kinds never collide, so `"1"` and `1` are distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub kind: HashKind,
    pub digest: u64,
}

pub trait Hashable {
    fn hash_key(&self) -> HashKey;
}

fn fx_digest<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

impl Hashable for str {
    fn hash_key(&self) -> HashKey {
        HashKey {
            kind: HashKind::String,
            digest: fx_digest(self),
        }
    }
}

impl Hashable for i64 {
    fn hash_key(&self) -> HashKey {
        HashKey {
            kind: HashKind::Integer,
            digest: *self as u64,
        }
    }
}

impl Hashable for FileValue {
    fn hash_key(&self) -> HashKey {
        HashKey {
            kind: HashKind::File,
            digest: fx_digest(self.id.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// Hash table that remembers insertion order.
#[derive(Debug, Clone, Default)]
pub struct HashValue {
    pairs: Vec<HashPair>,
    index: FxHashMap<HashKey, usize>,
}

impl HashValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, key: &HashKey) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.pairs[i].value)
    }

    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.get(&key.hash_key())
    }

    pub fn contains_key(&self, key: &HashKey) -> bool {
        self.index.contains_key(key)
    }

    /// Inserts under `key`, keeping the original position of an existing key.
    pub fn insert(&mut self, key: HashKey, key_value: Value, value: Value) {
        match self.index.get(&key) {
            Some(&i) => self.pairs[i] = HashPair { key: key_value, value },
            None => {
                self.index.insert(key, self.pairs.len());
                self.pairs.push(HashPair {
                    key: key_value,
                    value,
                });
            }
        }
    }

    pub fn insert_str(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let hash_key = key.as_str().hash_key();
        self.insert(hash_key, Value::String(key), value);
    }

    pub fn pairs(&self) -> impl Iterator<Item = &HashPair> {
        self.pairs.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.pairs.iter().map(|pair| &pair.key)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.pairs.iter().map(|pair| &pair.value)
    }
}

// Equal when both hold the same keys with equal values, in any order.
impl PartialEq for HashValue {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .index
                .iter()
                .all(|(key, &i)| other.get(key) == Some(&self.pairs[i].value))
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, pair) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &pair.key {
                Value::String(s) => write!(f, "{:?}: {}", s, pair.value)?,
                other => write!(f, "{}: {}", other, pair.value)?,
            }
        }
        write!(f, "}}")
    }
}

/// A closure: the literal it was made from and the scope it was made in.
pub struct FunctionValue {
    pub literal: Arc<FunctionLiteral>,
    pub scope: Scope,
}

impl FunctionValue {
    pub fn new(literal: Arc<FunctionLiteral>, scope: Scope) -> Self {
        Self { literal, scope }
    }

    pub fn name(&self) -> Option<&str> {
        self.literal.name.as_deref()
    }

    pub fn parameters(&self) -> &[String] {
        &self.literal.parameters
    }
}

impl fmt::Display for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "fn {}(", name)?,
            None => write!(f, "fn(")?,
        }
        write_separated(f, self.parameters())?;
        write!(f, ")")
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("name", &self.literal.name)
            .field("parameters", &self.literal.parameters)
            .finish_non_exhaustive()
    }
}

// Two closures are the same only if they come from the same literal and
// captured the same scope.
impl PartialEq for FunctionValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.literal, &other.literal) && self.scope.ptr_eq(&other.scope)
    }
}

pub type NativeFn = dyn Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, String>;

/// A native function supplied by the host.
pub struct BuiltinFunction {
    pub name: String,
    pub func: Box<NativeFn>,
}

impl BuiltinFunction {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, String> + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    pub fn call(&self, context: &mut CallContext<'_>, args: &[Value]) -> Result<Value, String> {
        (self.func)(context, args)
    }
}

impl fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BuiltinFunction({})", self.name)
    }
}

impl PartialEq for BuiltinFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Opaque descriptor of a host-owned file. Nothing here performs I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileValue {
    pub id: String,
    pub path: String,
    pub name: String,
    pub content_type: String,
    pub size: i64,
}

impl FileValue {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        name: impl Into<String>,
        content_type: impl Into<String>,
        size: i64,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            name: name.into(),
            content_type: content_type.into(),
            size,
        }
    }
}

impl fmt::Display for FileValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<file: {}, size: {}, contentType: {}>",
            self.name, self.size, self.content_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn equal_strings_and_integers_share_keys() {
        assert_eq!("abc".hash_key(), "abc".hash_key());
        assert_eq!(42i64.hash_key(), 42i64.hash_key());
        assert_ne!("abc".hash_key(), "abd".hash_key());
    }

    #[test]
    fn string_and_integer_keys_never_collide() {
        assert_ne!("1".hash_key(), 1i64.hash_key());
        assert_eq!(Value::Boolean(true).hash_key(), None);
    }

    #[test]
    fn reinsert_keeps_position() {
        let mut hash = HashValue::new();
        hash.insert_str("a", Value::Integer(1));
        hash.insert_str("b", Value::Integer(2));
        hash.insert_str("a", Value::Integer(3));

        assert_eq!(hash.len(), 2);
        assert_eq!(hash.get_str("a"), Some(&Value::Integer(3)));
        assert_eq!(Value::hash(hash).to_string(), r#"{"a": 3, "b": 2}"#);
    }

    #[test]
    fn stringification() {
        assert_eq!(Value::Decimal(2.0).to_string(), "2.0");
        assert_eq!(Value::Decimal(2.56).to_string(), "2.56");
        assert_eq!(
            Value::array(vec![Value::Integer(1), Value::string("a")]).to_string(),
            "[1, a]"
        );

        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(Value::DateTime(dt).to_string(), "2024-01-02T03:04:05Z");

        let file = FileValue::new("id-1", "/tmp/a.txt", "a.txt", "text/plain", 12);
        assert_eq!(
            Value::file(file).to_string(),
            "<file: a.txt, size: 12, contentType: text/plain>"
        );
    }

    #[test]
    fn containers_that_hold_themselves() {
        let a = Value::array(vec![Value::Integer(1)]);
        if let Value::Array(elements) = &a {
            elements.borrow_mut().push(a.clone());
        }
        assert_eq!(a.to_string(), "[1, [...]]");

        let b = Value::array(vec![Value::Integer(1)]);
        if let Value::Array(elements) = &b {
            elements.borrow_mut().push(b.clone());
        }
        assert!(a == b);
        assert!(a != Value::array(vec![Value::Integer(1), Value::Null]));

        let mut inner = HashValue::new();
        inner.insert_str("n", Value::Integer(1));
        let h = Value::hash(inner);
        if let Value::Hash(hash) = &h {
            hash.borrow_mut().insert_str("me", h.clone());
        }
        assert_eq!(h.to_string(), r#"{"n": 1, "me": {...}}"#);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::string("").is_truthy());
    }
}
