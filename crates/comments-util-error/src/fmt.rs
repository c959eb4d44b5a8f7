use std::fmt;

/// Renders an error and its `source()` chain on a single line, e.g.
/// `"connection reset: read timed out"`, for use inside `tracing` fields
/// where the full `{:?}` backtrace-style `Debug` output would be noise.
pub trait FmtCompact {
    fn fmt_compact(&self) -> FmtCompactDisplay<'_>;
}

impl<E> FmtCompact for E
where
    E: std::error::Error,
{
    fn fmt_compact(&self) -> FmtCompactDisplay<'_> {
        FmtCompactDisplay(self)
    }
}

pub struct FmtCompactDisplay<'e>(&'e dyn std::error::Error);

impl fmt::Display for FmtCompactDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut cur = self.0.source();
        while let Some(source) = cur {
            write!(f, ": {source}")?;
            cur = source.source();
        }
        Ok(())
    }
}
