//! Turning application identifiers into SQL identifier text.
//!
//! Each segment of an [`Identifier`] goes through the inbound half of the active
//! [`NamingStrategy`], then the active [`Stropping`] escape, then the stropping wrap; the
//! rendered segments are joined with `.`. Both bindings are thread-local and installed for a
//! dynamic extent with [`with_naming_strategy`] and [`with_stropping`].
//!
//! ```rust
//! use sql_context::prelude::*;
//!
//! assert_eq!(render_identifier(["a", "b"]), "a.b");
//! let quoted = with_stropping(Stropping::new("`", "`"), || render_identifier(["a", "b"]));
//! assert_eq!(quoted, "`a`.`b`");
//! let upper = with_naming_strategy(NamingStrategy::uppercase(), || render_identifier(["a", "b"]));
//! assert_eq!(upper, "A.B");
//! ```

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::types::Dialect;

type NameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([a-z0-9])([A-Z])").expect("camel boundary pattern compiles"));

/// Pair of conversions between application and driver identifier spelling.
#[derive(Clone)]
pub struct NamingStrategy {
    inbound: NameFn,
    outbound: NameFn,
}

impl NamingStrategy {
    /// `inbound` is applied when building SQL, `outbound` to names the driver hands back.
    pub fn new<I, O>(inbound: I, outbound: O) -> Self
    where
        I: Fn(&str) -> String + Send + Sync + 'static,
        O: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            inbound: Arc::new(inbound),
            outbound: Arc::new(outbound),
        }
    }

    #[must_use]
    pub fn identity() -> Self {
        Self::new(str::to_owned, str::to_owned)
    }

    /// Lowercase going in and coming back.
    #[must_use]
    pub fn lowercase() -> Self {
        Self::new(str::to_lowercase, str::to_lowercase)
    }

    /// Uppercase going in, lowercase coming back.
    #[must_use]
    pub fn uppercase() -> Self {
        Self::new(str::to_uppercase, str::to_lowercase)
    }

    /// `first-name` in the application, `first_name` in the database.
    #[must_use]
    pub fn kebab_to_snake() -> Self {
        Self::new(|s| s.replace('-', "_"), |s| s.replace('_', "-"))
    }

    /// `firstName` in the application, `first_name` in the database.
    #[must_use]
    pub fn camel_to_snake() -> Self {
        Self::new(camel_to_snake, snake_to_camel)
    }

    #[must_use]
    pub fn to_sql(&self, name: &str) -> String {
        (self.inbound)(name)
    }

    #[must_use]
    pub fn from_sql(&self, name: &str) -> String {
        (self.outbound)(name)
    }
}

impl Default for NamingStrategy {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for NamingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamingStrategy").finish_non_exhaustive()
    }
}

fn camel_to_snake(name: &str) -> String {
    CAMEL_BOUNDARY.replace_all(name, "${1}_${2}").to_lowercase()
}

fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, part) in name.split('_').enumerate() {
        if i == 0 {
            out.push_str(part);
            continue;
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Delimiters wrapped around each identifier segment plus the escape applied to its interior.
#[derive(Clone)]
pub struct Stropping {
    prefix: String,
    suffix: String,
    escape: NameFn,
}

impl Stropping {
    /// No wrapping and no escaping.
    #[must_use]
    pub fn none() -> Self {
        Self::new("", "")
    }

    /// Wrap in `prefix`/`suffix` without escaping the interior.
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            escape: Arc::new(str::to_owned),
        }
    }

    /// Wrap in `prefix`/`suffix`, doubling every occurrence of `suffix` inside the name.
    pub fn doubling(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        let doubled = suffix.repeat(2);
        let needle = suffix.clone();
        Self::new(prefix, suffix).with_escape(move |s| {
            if needle.is_empty() {
                s.to_owned()
            } else {
                s.replace(needle.as_str(), &doubled)
            }
        })
    }

    #[must_use]
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::None => Self::none(),
            Dialect::Ansi => Self::doubling("\"", "\""),
            Dialect::MySql => Self::doubling("`", "`"),
            Dialect::SqlServer => Self::doubling("[", "]"),
        }
    }

    #[must_use]
    pub fn with_escape<F>(mut self, escape: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.escape = Arc::new(escape);
        self
    }

    #[must_use]
    pub fn escape(&self, text: &str) -> String {
        (self.escape)(text)
    }

    #[must_use]
    pub fn wrap(&self, text: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + text.len() + self.suffix.len());
        out.push_str(&self.prefix);
        out.push_str(text);
        out.push_str(&self.suffix);
        out
    }
}

impl Default for Stropping {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Dialect> for Stropping {
    fn from(dialect: Dialect) -> Self {
        Self::for_dialect(dialect)
    }
}

impl fmt::Debug for Stropping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stropping")
            .field("prefix", &self.prefix)
            .field("suffix", &self.suffix)
            .finish_non_exhaustive()
    }
}

/// Application values that have a symbolic name, such as a column enum.
pub trait SymbolicName {
    fn name(&self) -> Cow<'_, str>;
}

/// A single name or an ordered sequence of names forming a qualified identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    segments: Vec<String>,
}

impl Identifier {
    pub fn qualified<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn symbol(value: &impl SymbolicName) -> Self {
        Self::qualified([value.name().into_owned()])
    }

    /// Fallback for values without a symbolic name: their `Display` form.
    pub fn display(value: &impl fmt::Display) -> Self {
        Self::qualified([value.to_string()])
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Render with explicit bindings instead of the thread-local ones.
    #[must_use]
    pub fn render_with(&self, strategy: &NamingStrategy, stropping: &Stropping) -> String {
        self.segments
            .iter()
            .map(|segment| stropping.wrap(&stropping.escape(&strategy.to_sql(segment))))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::qualified([value])
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self::qualified([value])
    }
}

impl From<&String> for Identifier {
    fn from(value: &String) -> Self {
        Self::qualified([value.as_str()])
    }
}

impl From<&[&str]> for Identifier {
    fn from(value: &[&str]) -> Self {
        Self::qualified(value.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Identifier {
    fn from(value: [&str; N]) -> Self {
        Self::qualified(value)
    }
}

impl From<Vec<&str>> for Identifier {
    fn from(value: Vec<&str>) -> Self {
        Self::qualified(value)
    }
}

impl From<Vec<String>> for Identifier {
    fn from(value: Vec<String>) -> Self {
        Self { segments: value }
    }
}

#[derive(Default)]
struct Bindings {
    naming: NamingStrategy,
    stropping: Stropping,
}

thread_local! {
    static BINDINGS: RefCell<Bindings> = RefCell::new(Bindings::default());
}

/// Puts the previous binding back when the scope ends, unwinding included.
struct Restore<F: FnMut()>(F);

impl<F: FnMut()> Drop for Restore<F> {
    fn drop(&mut self) {
        (self.0)();
    }
}

/// Run `body` with `strategy` as this thread's naming strategy.
pub fn with_naming_strategy<R>(strategy: NamingStrategy, body: impl FnOnce() -> R) -> R {
    let mut previous = Some(BINDINGS.with_borrow_mut(|b| std::mem::replace(&mut b.naming, strategy)));
    let _restore = Restore(move || {
        if let Some(previous) = previous.take() {
            BINDINGS.with_borrow_mut(|b| b.naming = previous);
        }
    });
    body()
}

/// Run `body` with `stropping` as this thread's stropping configuration.
pub fn with_stropping<R>(stropping: impl Into<Stropping>, body: impl FnOnce() -> R) -> R {
    let stropping = stropping.into();
    let mut previous =
        Some(BINDINGS.with_borrow_mut(|b| std::mem::replace(&mut b.stropping, stropping)));
    let _restore = Restore(move || {
        if let Some(previous) = previous.take() {
            BINDINGS.with_borrow_mut(|b| b.stropping = previous);
        }
    });
    body()
}

/// The naming strategy bound on this thread.
#[must_use]
pub fn current_naming_strategy() -> NamingStrategy {
    BINDINGS.with_borrow(|b| b.naming.clone())
}

#[must_use]
pub fn current_stropping() -> Stropping {
    BINDINGS.with_borrow(|b| b.stropping.clone())
}

/// Render `identifier` using this thread's naming strategy and stropping.
pub fn render_identifier(identifier: impl Into<Identifier>) -> String {
    let identifier = identifier.into();
    let (naming, stropping) = BINDINGS.with_borrow(|b| (b.naming.clone(), b.stropping.clone()));
    identifier.render_with(&naming, &stropping)
}

/// Map a driver-reported name back to the application spelling.
#[must_use]
pub fn outbound_identifier(name: &str) -> String {
    BINDINGS.with_borrow(|b| b.naming.from_sql(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Column {
        UserId,
    }

    impl SymbolicName for Column {
        fn name(&self) -> Cow<'_, str> {
            match self {
                Column::UserId => Cow::Borrowed("user-id"),
            }
        }
    }

    #[test]
    fn default_bindings_join_segments() {
        assert_eq!(render_identifier(["a", "b"]), "a.b");
        assert_eq!(render_identifier("plain"), "plain");
    }

    #[test]
    fn backtick_stropping_without_escape() {
        let sql = with_stropping(Stropping::new("`", "`"), || render_identifier(["a", "b"]));
        assert_eq!(sql, "`a`.`b`");
    }

    #[test]
    fn uppercase_strategy() {
        let sql = with_naming_strategy(NamingStrategy::uppercase(), || render_identifier(["a", "b"]));
        assert_eq!(sql, "A.B");
    }

    #[test]
    fn escape_runs_after_strategy_and_before_wrap() {
        let strategy = NamingStrategy::new(|s| format!("{s}\""), str::to_owned);
        let sql = with_naming_strategy(strategy, || {
            with_stropping(Dialect::Ansi, || render_identifier("odd"))
        });
        assert_eq!(sql, "\"odd\"\"\"");
    }

    #[test]
    fn dialect_presets() {
        let id = Identifier::from(["dbo", "my]table"]);
        let strategy = NamingStrategy::identity();
        assert_eq!(
            id.render_with(&strategy, &Stropping::for_dialect(Dialect::SqlServer)),
            "[dbo].[my]]table]"
        );
        assert_eq!(
            id.render_with(&strategy, &Stropping::for_dialect(Dialect::MySql)),
            "`dbo`.`my]table`"
        );
    }

    #[test]
    fn bindings_restore_after_scope() {
        with_stropping(Dialect::Ansi, || {
            with_stropping(Stropping::none(), || assert_eq!(render_identifier("x"), "x"));
            assert_eq!(render_identifier("x"), "\"x\"");
        });
        assert_eq!(render_identifier("x"), "x");
    }

    #[test]
    fn current_bindings_follow_the_active_scope() {
        with_naming_strategy(NamingStrategy::kebab_to_snake(), || {
            with_stropping(Dialect::MySql, || {
                assert_eq!(current_naming_strategy().to_sql("order-id"), "order_id");
                assert_eq!(current_stropping().wrap("order_id"), "`order_id`");
            });
            assert_eq!(current_stropping().wrap("order_id"), "order_id");
        });
        assert_eq!(current_naming_strategy().to_sql("order-id"), "order-id");
    }

    #[test]
    fn bindings_restore_after_panic() {
        let caught = std::panic::catch_unwind(|| {
            with_naming_strategy(NamingStrategy::uppercase(), || panic!("boom"));
        });
        assert!(caught.is_err());
        assert_eq!(render_identifier("x"), "x");
    }

    #[test]
    fn symbolic_and_display_segments() {
        let sql = with_naming_strategy(NamingStrategy::kebab_to_snake(), || {
            render_identifier(Identifier::symbol(&Column::UserId))
        });
        assert_eq!(sql, "user_id");
        assert_eq!(render_identifier(Identifier::display(&42)), "42");
    }

    #[test]
    fn camel_case_round_trip_names() {
        let strategy = NamingStrategy::camel_to_snake();
        assert_eq!(strategy.to_sql("createdAtUtc"), "created_at_utc");
        assert_eq!(strategy.from_sql("created_at_utc"), "createdAtUtc");
        let outbound = with_naming_strategy(NamingStrategy::kebab_to_snake(), || {
            outbound_identifier("first_name")
        });
        assert_eq!(outbound, "first-name");
    }
}
