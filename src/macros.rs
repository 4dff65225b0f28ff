/// Build a [`Fragment`](crate::Fragment) from alternating text literals and values.
///
/// The call starts with a string literal and then alternates value, literal, value, ...;
/// it may end on either. Every value is converted with [`Arg::from`](crate::Arg), so
/// scalars, vectors/slices/arrays of scalars, nested fragments, and
/// [`Literal`](crate::Literal)s are all accepted. Two adjacent values do not compile.
///
/// ```rust
/// use sql_fragments::{sql, sql_lit};
///
/// # fn main() -> Result<(), sql_fragments::SqlFragmentsError> {
/// let ids = vec![1_i64, 2, 3];
/// let q = sql!("SELECT ", sql_lit!("id, name"), " FROM users WHERE id IN (", ids, ")")?;
/// assert_eq!(q.parse().text(), "SELECT id, name FROM users WHERE id IN ($1, $2, $3)");
///
/// let by_status = sql!("SELECT id FROM runs WHERE status = ", "queued")?;
/// assert_eq!(by_status.parse().text(), "SELECT id FROM runs WHERE status = $1");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Evaluates to `Err(SqlFragmentsError::ConstructionError)` if a sequence value is empty.
#[macro_export]
macro_rules! sql {
    ($text:literal $($rest:tt)*) => {
        $crate::__sql_parts!([] [] $text $($rest)*)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __sql_parts {
    ([$($part:expr),*] [$($value:expr),*] $text:literal, $next:expr, $($rest:tt)+) => {
        $crate::__sql_parts!([$($part,)* $text] [$($value,)* $next] $($rest)+)
    };
    ([$($part:expr),*] [$($value:expr),*] $text:literal, $next:expr $(,)?) => {
        $crate::__sql_parts!(@build [$($part,)* $text, ""] [$($value,)* $next])
    };
    ([$($part:expr),*] [$($value:expr),*] $text:literal $(,)?) => {
        $crate::__sql_parts!(@build [$($part,)* $text] [$($value),*])
    };
    (@build [$($part:expr),*] [$($value:expr),*]) => {
        $crate::Fragment::from_parts(
            &[$($part),*],
            ::std::vec![$($crate::Arg::from($value)),*],
        )
    };
}

/// Raw SQL snippet from a single string literal. Interpolation is rejected at compile time.
///
/// ```rust
/// let order = sql_fragments::sql_lit!("ORDER BY created_at DESC");
/// assert_eq!(order.as_str(), "ORDER BY created_at DESC");
/// ```
#[macro_export]
macro_rules! sql_lit {
    ($text:literal $(,)?) => {
        $crate::Literal::from_static($text)
    };
    ($text:literal, $($rest:tt)+) => {
        ::std::compile_error!("sql_lit! does not allow interpolated values")
    };
}
