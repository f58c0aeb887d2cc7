use lasso::{Spur, ThreadedRodeo};
use std::sync::OnceLock;

/// Interned string key. Player names, survivor ids, weapon and structure
/// class names repeat on nearly every log line, so events store 4-byte keys
/// rather than owned strings.
pub type IStr = Spur;

/// Global interner shared by all parse workers.
static INTERNER: OnceLock<ThreadedRodeo> = OnceLock::new();

/// Cached key for the empty string.
static EMPTY_ISTR: OnceLock<Spur> = OnceLock::new();

/// Get the global interner (initializes on first call).
pub fn interner() -> &'static ThreadedRodeo {
    INTERNER.get_or_init(ThreadedRodeo::default)
}

/// Intern a string, returning a key.
pub fn intern(s: &str) -> IStr {
    interner().get_or_intern(s)
}

/// Key for the empty string. Never use IStr::default() for this:
/// Spur::default() aliases whatever string happened to be interned first.
#[inline]
pub fn empty_istr() -> IStr {
    *EMPTY_ISTR.get_or_init(|| interner().get_or_intern(""))
}

/// Resolve a key back to its string.
pub fn resolve(key: IStr) -> &'static str {
    interner().resolve(&key)
}
