//! Identity keys used for provider lookup.
//!
//! Tokens compare by identity, never by name:
//! - type tokens are keyed by `TypeId` (`Token::of::<T>()`),
//! - injection tokens get a process-unique id when created (`Token::new("CONFIG")`).
//!
//! Two injection tokens created with the same name are different keys.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INJECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Eq, PartialEq, Hash)]
enum TokenKey {
    Type(TypeId),
    Injection(u64),
}

/// Identity key for a provided value.
#[derive(Clone, Copy)]
pub struct Token {
    key: TokenKey,
    name: &'static str,
}

impl Token {
    /// Type token for `T`, named after the last path segment of its type name.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            key: TokenKey::Type(TypeId::of::<T>()),
            name: short_type_name(std::any::type_name::<T>()),
        }
    }

    /// Fresh opaque injection token.
    ///
    /// Typically stored in a `static LazyLock<Token>` so every module refers to the same key.
    pub fn new(name: &'static str) -> Self {
        Self {
            key: TokenKey::Injection(NEXT_INJECTION_ID.fetch_add(1, Ordering::Relaxed)),
            name,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `true` for opaque tokens created with [`Token::new`], `false` for type tokens.
    #[inline]
    pub fn is_injection_token(&self) -> bool {
        matches!(self.key, TokenKey::Injection(_))
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key {
            TokenKey::Type(_) => write!(f, "Token({})", self.name),
            TokenKey::Injection(id) => write!(f, "InjectionToken({}#{id})", self.name),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// `my_crate::app::AppModule` -> `AppModule`; generic arguments are kept.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
