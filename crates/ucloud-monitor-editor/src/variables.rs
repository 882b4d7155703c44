//! Template variable tables and substitution.
//!
//! Grafana lets users embed dashboard variables in any query field. Before a
//! query or lookup is sent anywhere, each field is resolved against a snapshot
//! of the dashboard's variable table using [`substitute`].
//!
//! Three marker syntaxes are recognised:
//!
//! - `$name`, which only matches when the following character cannot be part of
//!   a variable name,
//! - `${name}`,
//! - `[[name]]`.
//!
//! Substitution is a single left-to-right pass: replaced text is never scanned
//! again, and when several variable names could match at the same position the
//! longest one wins.
use serde::{Deserialize, Serialize};

/// The current value of a template variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    /// A single selected value.
    Single(String),
    /// Several selected values, from a multi-value variable.
    Multi(Vec<String>),
}

impl VariableValue {
    /// Render the value as it should appear in place of a marker.
    ///
    /// Multi-value variables use Grafana's default glob format, e.g. `{a,b}`.
    /// Nothing selected renders as an empty string.
    pub fn render(&self) -> String {
        match self {
            Self::Single(v) => v.clone(),
            Self::Multi(vs) if vs.is_empty() => String::new(),
            Self::Multi(vs) if vs.len() == 1 => vs[0].clone(),
            Self::Multi(vs) => format!("{{{}}}", vs.join(",")),
        }
    }
}

/// The currently selected option of a variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Current {
    /// The selected value.
    pub value: VariableValue,
}

/// A single template variable, as exposed by the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// The variable name, without any marker syntax.
    pub name: String,
    /// The currently selected option.
    pub current: Current,
}

impl Variable {
    /// Create a single-valued variable.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: Current {
                value: VariableValue::Single(value.into()),
            },
        }
    }

    /// Create a multi-valued variable.
    pub fn multi<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            current: Current {
                value: VariableValue::Multi(values.into_iter().map(Into::into).collect()),
            },
        }
    }
}

/// A read-only snapshot of the host's variable table.
///
/// Deserializes from the JSON array the host exposes, e.g.
/// `[{"name": "region", "current": {"value": "cn-bj2"}}]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableTable {
    variables: Vec<Variable>,
}

impl VariableTable {
    /// Create a table from a list of variables.
    ///
    /// Later entries with a duplicate name are ignored.
    pub fn new(variables: impl IntoIterator<Item = Variable>) -> Self {
        let mut table = Self::default();
        for variable in variables {
            if table.get(&variable.name).is_none() {
                table.variables.push(variable);
            }
        }
        table
    }

    /// Look up a variable by name.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Returns `true` if the table holds no variables.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Find the longest variable name that `s` starts with.
    fn longest_prefix(&self, s: &str, bounded: bool) -> Option<&Variable> {
        self.variables
            .iter()
            .filter(|v| !v.name.is_empty() && s.starts_with(v.name.as_str()))
            .filter(|v| !bounded || !s[v.name.len()..].starts_with(is_name_char))
            .max_by_key(|v| v.name.len())
    }

    /// Find a variable whose name is exactly `s`.
    fn exact(&self, s: &str) -> Option<&Variable> {
        self.get(s)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Returns `true` if `value` contains anything that looks like a variable marker.
pub fn has_marker(value: &str) -> bool {
    value.contains('$') || value.contains("[[")
}

/// Replace every known variable marker in `value` with the variable's current value.
///
/// Markers naming unknown variables are left untouched, and this function never fails.
pub fn substitute(value: &str, table: &VariableTable) -> String {
    if !has_marker(value) || table.is_empty() {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(idx) = rest.find(['$', '[']) {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        match match_marker(rest, table) {
            Some((variable, consumed)) => {
                out.push_str(&variable.current.value.render());
                rest = &rest[consumed..];
            }
            None => {
                // '$' and '[' are both one byte wide.
                out.push_str(&rest[..1]);
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Try to match a marker at the start of `s`, returning the variable and the
/// number of bytes the marker spans.
fn match_marker<'a>(s: &str, table: &'a VariableTable) -> Option<(&'a Variable, usize)> {
    if let Some(inner) = s.strip_prefix("${") {
        let end = inner.find('}')?;
        let variable = table.exact(&inner[..end])?;
        return Some((variable, end + 3));
    }
    if let Some(inner) = s.strip_prefix("[[") {
        let end = inner.find("]]")?;
        let variable = table.exact(&inner[..end])?;
        return Some((variable, end + 4));
    }
    let inner = s.strip_prefix('$')?;
    let variable = table.longest_prefix(inner, true)?;
    Some((variable, variable.name.len() + 1))
}
