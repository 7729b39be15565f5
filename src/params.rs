use crate::Value;

/// SQL parameter container.
#[derive(Clone, Debug, PartialEq)]
pub enum Params {
    /// Positional values mapped to `?` placeholders.
    Positional(Vec<Value>),
    /// Named values mapped to `:name` style placeholders.
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Builds positional parameters.
    pub fn positional(values: impl Into<Vec<Value>>) -> Self {
        Self::Positional(values.into())
    }

    /// Builds named parameters.
    ///
    /// Names can be provided with or without prefix (`:`, `@`, `$`).
    pub fn named<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Value> for Params {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::Positional(iter.into_iter().collect())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl<const N: usize> From<[Value; N]> for Params {
    fn from(values: [Value; N]) -> Self {
        Self::Positional(values.into())
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(values: Vec<(String, Value)>) -> Self {
        Self::Named(values)
    }
}
