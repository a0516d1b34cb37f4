//! Typed flags that a command handler registers before parsing its arguments.

use std::collections::HashMap;
use std::fmt::{self, Display};

use super::args::ArgsError;

/// The type of value a flag accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// Any string.
    Str,
    /// A signed integer.
    Int,
    /// A boolean switch; `--name` alone means `true`.
    Bool,
}

impl FlagKind {
    fn name(self) -> &'static str {
        match self {
            FlagKind::Str => "string",
            FlagKind::Int => "int",
            FlagKind::Bool => "bool",
        }
    }
}

/// A typed flag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl FlagValue {
    /// The kind of this value.
    pub fn kind(&self) -> FlagKind {
        match self {
            FlagValue::Str(_) => FlagKind::Str,
            FlagValue::Int(_) => FlagKind::Int,
            FlagValue::Bool(_) => FlagKind::Bool,
        }
    }

    /// Parse a value of the given kind from a string.
    pub fn parse(kind: FlagKind, s: &str) -> Option<Self> {
        match kind {
            FlagKind::Str => Some(FlagValue::Str(s.to_string())),
            FlagKind::Int => s.parse().ok().map(FlagValue::Int),
            FlagKind::Bool => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(FlagValue::Bool(true)),
                "false" | "0" | "no" | "off" => Some(FlagValue::Bool(false)),
                _ => None,
            },
        }
    }
}

impl Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Str(s) => write!(f, "{:?}", s),
            FlagValue::Int(i) => write!(f, "{}", i),
            FlagValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::Str(value.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::Str(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Int(value)
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

/// A registered flag.
#[derive(Debug, Clone)]
pub struct Flag {
    name: Box<str>,
    help: Box<str>,
    default: FlagValue,
    value: Option<FlagValue>,
}

impl Flag {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn help(&self) -> &str {
        &self.help
    }

    #[inline]
    pub fn kind(&self) -> FlagKind {
        self.default.kind()
    }

    /// The parsed value, or the default when the flag was not given.
    #[inline]
    pub fn value(&self) -> &FlagValue {
        self.value.as_ref().unwrap_or(&self.default)
    }

    /// Whether the flag appeared on the command line.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

/// Ordered set of flags for one command invocation.
#[derive(Debug, Clone, Default)]
pub struct FlagSet {
    flags: Vec<Flag>,
    index: HashMap<Box<str>, usize>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flag. The kind is taken from `default`.
    pub fn register(
        &mut self,
        name: &str,
        default: FlagValue,
        help: &str,
    ) -> Result<(), ArgsError> {
        if self.index.contains_key(name) {
            return Err(ArgsError::DuplicateFlag {
                name: name.to_string(),
            });
        }

        self.index.insert(name.into(), self.flags.len());
        self.flags.push(Flag {
            name: name.into(),
            help: help.into(),
            default,
            value: None,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Flag> {
        self.index.get(name).map(|&i| &self.flags[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Parse `raw` according to the flag's kind and store it.
    pub(crate) fn set(&mut self, name: &str, raw: &str) -> Result<(), ArgsError> {
        let Some(&i) = self.index.get(name) else {
            return Err(ArgsError::FlagSyntax {
                flag: name.to_string(),
                reason: "flag provided but not defined".to_string(),
            });
        };

        let flag = &mut self.flags[i];
        let kind = flag.kind();
        let value = FlagValue::parse(kind, raw).ok_or_else(|| ArgsError::FlagSyntax {
            flag: name.to_string(),
            reason: format!("invalid {} value {:?}", kind.name(), raw),
        })?;
        flag.value = Some(value);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Render one line of help per flag, in registration order.
    pub fn usage(&self) -> String {
        let mut out = String::new();
        for flag in &self.flags {
            let placeholder = match flag.kind() {
                FlagKind::Bool => String::new(),
                kind => format!(" <{}>", kind.name()),
            };
            out.push_str(&format!(
                "  --{}{}\n        {} (default {})\n",
                flag.name, placeholder, flag.help, flag.default
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_value_parse() {
        assert_eq!(FlagValue::parse(FlagKind::Int, "42"), Some(FlagValue::Int(42)));
        assert_eq!(FlagValue::parse(FlagKind::Int, "-7"), Some(FlagValue::Int(-7)));
        assert_eq!(FlagValue::parse(FlagKind::Int, "abc"), None);
        assert_eq!(FlagValue::parse(FlagKind::Bool, "off"), Some(FlagValue::Bool(false)));
        assert_eq!(FlagValue::parse(FlagKind::Bool, "maybe"), None);
        assert_eq!(
            FlagValue::parse(FlagKind::Str, "x y"),
            Some(FlagValue::Str("x y".to_string()))
        );
    }

    #[test]
    fn test_register_and_default() {
        let mut set = FlagSet::new();
        set.register("cnt", 5i64.into(), "number of lines").unwrap();

        let flag = set.get("cnt").unwrap();
        assert_eq!(flag.kind(), FlagKind::Int);
        assert_eq!(flag.value(), &FlagValue::Int(5));
        assert!(!flag.is_set());
    }

    #[test]
    fn test_duplicate_flag() {
        let mut set = FlagSet::new();
        set.register("cnt", 5i64.into(), "").unwrap();
        let err = set.register("cnt", 1i64.into(), "").unwrap_err();
        assert_eq!(err, ArgsError::DuplicateFlag { name: "cnt".to_string() });
    }

    #[test]
    fn test_set_type_mismatch_names_flag() {
        let mut set = FlagSet::new();
        set.register("cnt", 5i64.into(), "").unwrap();
        let err = set.set("cnt", "many").unwrap_err();
        assert!(matches!(err, ArgsError::FlagSyntax { ref flag, .. } if flag == "cnt"));
        assert!(err.to_string().contains("cnt"));
    }

    #[test]
    fn test_usage_lists_flags_in_order() {
        let mut set = FlagSet::new();
        set.register("cnt", 5i64.into(), "number of lines").unwrap();
        set.register("verbose", false.into(), "chatty output").unwrap();

        let usage = set.usage();
        let cnt = usage.find("--cnt <int>").unwrap();
        let verbose = usage.find("--verbose").unwrap();
        assert!(cnt < verbose);
        assert!(usage.contains("number of lines (default 5)"));
    }
}
