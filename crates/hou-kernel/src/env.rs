//! Global environment
//!
//! Maps constant names to declarations. A declaration with a value is a
//! definition the type checker may delta-unfold; one without is an axiom
//! or opaque constant.

use crate::expr::Expr;
use crate::level::Level;
use crate::name::Name;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// A global constant declaration
#[derive(Clone, Debug)]
pub struct Declaration {
    pub name: Name,
    /// Universe parameters the type (and value) are polymorphic over
    pub level_params: Vec<Name>,
    pub ty: Expr,
    /// Unfoldable value, if this is a definition
    pub value: Option<Expr>,
}

impl Declaration {
    /// An axiom or opaque constant
    pub fn axiom(name: Name, level_params: Vec<Name>, ty: Expr) -> Self {
        Self {
            name,
            level_params,
            ty,
            value: None,
        }
    }

    /// A definition with an unfoldable value
    pub fn definition(name: Name, level_params: Vec<Name>, ty: Expr, value: Expr) -> Self {
        Self {
            name,
            level_params,
            ty,
            value: Some(value),
        }
    }

    /// The declared type with universe parameters instantiated
    pub fn instantiated_type(&self, levels: &[Level]) -> Expr {
        let subst: Vec<(Name, Level)> = self
            .level_params
            .iter()
            .cloned()
            .zip(levels.iter().cloned())
            .collect();
        self.ty.instantiate_level_params(&subst)
    }

    /// The value with universe parameters instantiated, if any
    pub fn instantiated_value(&self, levels: &[Level]) -> Option<Expr> {
        let subst: Vec<(Name, Level)> = self
            .level_params
            .iter()
            .cloned()
            .zip(levels.iter().cloned())
            .collect();
        self.value
            .as_ref()
            .map(|v| v.instantiate_level_params(&subst))
    }
}

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("declaration already exists: {0}")]
    AlreadyDeclared(Name),
}

/// The global environment of declarations
#[derive(Clone, Debug, Default)]
pub struct Environment {
    decls: FxHashMap<Name, Declaration>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration; names are declared at most once
    pub fn add_decl(&mut self, decl: Declaration) -> Result<(), EnvError> {
        if self.decls.contains_key(&decl.name) {
            return Err(EnvError::AlreadyDeclared(decl.name));
        }
        self.decls.insert(decl.name.clone(), decl);
        Ok(())
    }

    pub fn get(&self, name: &Name) -> Option<&Declaration> {
        self.decls.get(name)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.decls.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut env = Environment::new();
        let d = Declaration::axiom(Name::simple("A"), vec![], Expr::type_());
        env.add_decl(d.clone()).unwrap();
        assert!(matches!(
            env.add_decl(d),
            Err(EnvError::AlreadyDeclared(_))
        ));
    }

    #[test]
    fn test_instantiated_type() {
        let u = Name::simple("u");
        let d = Declaration::axiom(
            Name::simple("List"),
            vec![u.clone()],
            Expr::sort(Level::succ(Level::param(u))),
        );
        let t = d.instantiated_type(&[Level::zero()]);
        assert_eq!(t, Expr::sort(Level::one()));
    }
}
