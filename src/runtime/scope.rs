use std::collections::HashMap;
use std::sync::Arc;

use crate::expr::Expression;

/// Named constants visible to a requirement expression
///
/// The table is shared behind an `Arc`, so cloning a scope for each worker
/// of a batch compile is cheap. Defining a constant copies the table only if
/// another clone still holds it.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    constants: Arc<HashMap<String, Expression>>,
}

impl Scope {
    /// Creates an empty scope
    pub fn new() -> Self {
        Scope::default()
    }

    /// Creates a scope with predefined constants
    pub fn with_constants(constants: HashMap<String, Expression>) -> Self {
        Scope {
            constants: Arc::new(constants),
        }
    }

    /// Defines or replaces a constant
    pub fn define(&mut self, name: impl Into<String>, value: Expression) {
        Arc::make_mut(&mut self.constants).insert(name.into(), value);
    }

    /// Looks up a constant
    pub fn get(&self, name: &str) -> Option<&Expression> {
        self.constants.get(name)
    }

    /// Whether a constant is defined
    pub fn contains(&self, name: &str) -> bool {
        self.constants.contains_key(name)
    }

    /// Number of defined constants
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Whether the scope has no constants
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get() {
        let mut scope = Scope::new();
        assert!(scope.is_empty());
        scope.define("lives", Expression::Integer(3));
        assert_eq!(scope.get("lives"), Some(&Expression::Integer(3)));
        assert!(scope.get("score").is_none());
    }

    #[test]
    fn test_clone_is_copy_on_write() {
        let mut base = Scope::with_constants(HashMap::from([(
            "level".to_string(),
            Expression::Integer(1),
        )]));
        let shared = base.clone();
        base.define("level", Expression::Integer(2));

        assert_eq!(base.get("level"), Some(&Expression::Integer(2)));
        assert_eq!(shared.get("level"), Some(&Expression::Integer(1)));
        assert_eq!(shared.len(), 1);
    }
}
