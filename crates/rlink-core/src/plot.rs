//! Base R graphics helpers.
//!
//! Each helper pushes the series as `rlink.x`/`rlink.y` and calls `plot` or
//! `lines` on them.

use crate::session::Session;
use crate::Result;

/// Optional graphical parameters passed to `plot`/`lines`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphConfig {
    params: Vec<(&'static str, String)>,
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `col`.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.params.push(("col", color.into()));
        self
    }

    /// Set `type` (`"p"`, `"l"`, `"b"`, ...).
    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.params.push(("type", kind.into()));
        self
    }

    /// Trailing argument list, including the leading comma.
    fn params(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!(", {}={:?}", k, v))
            .collect()
    }
}

const X_VAR: &str = "rlink.x";
const Y_VAR: &str = "rlink.y";

fn call(function: &str, config: &GraphConfig) -> String {
    format!("{}({}, {}{})", function, X_VAR, Y_VAR, config.params())
}

fn index_range(n: usize) -> Vec<f64> {
    (1..=n).map(|i| i as f64).collect()
}

async fn draw(
    session: &mut Session,
    function: &str,
    x: &[f64],
    y: &[f64],
    config: &GraphConfig,
) -> Result<()> {
    session.push(x, X_VAR).await?;
    session.push(y, Y_VAR).await?;
    session.run(&call(function, config)).await
}

/// Start a new plot of `y` against `x`.
pub async fn plot(session: &mut Session, x: &[f64], y: &[f64], config: &GraphConfig) -> Result<()> {
    draw(session, "plot", x, y, config).await
}

/// Add `y` against `x` to the current plot as lines.
pub async fn lines(session: &mut Session, x: &[f64], y: &[f64], config: &GraphConfig) -> Result<()> {
    draw(session, "lines", x, y, config).await
}

/// [`plot`] with `1..=y.len()` as x.
pub async fn plot_x(session: &mut Session, y: &[f64], config: &GraphConfig) -> Result<()> {
    plot(session, &index_range(y.len()), y, config).await
}

/// [`lines`] with `1..=y.len()` as x.
pub async fn lines_x(session: &mut Session, y: &[f64], config: &GraphConfig) -> Result<()> {
    lines(session, &index_range(y.len()), y, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_without_params() {
        assert_eq!(call("plot", &GraphConfig::new()), "plot(rlink.x, rlink.y)");
    }

    #[test]
    fn test_call_params_keep_order() {
        let config = GraphConfig::new().with_type("l").with_color("red");
        assert_eq!(
            call("lines", &config),
            r#"lines(rlink.x, rlink.y, type="l", col="red")"#
        );
    }

    #[test]
    fn test_param_values_are_quoted() {
        let config = GraphConfig::new().with_color(r#"bl"ue"#);
        assert_eq!(config.params(), r#", col="bl\"ue""#);
    }

    #[test]
    fn test_index_range() {
        assert_eq!(index_range(3), vec![1.0, 2.0, 3.0]);
        assert!(index_range(0).is_empty());
    }
}
