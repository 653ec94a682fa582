//! Named strategy registry
//!
//! The tournament never shares a strategy instance between matches. It
//! stores a factory per name and builds a fresh instance for every seat.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::game::Seat;
use crate::strategy::{describe_strategy, BuiltinStrategy, Strategy, StrategyBase};
use crate::vm::BytecodeStrategy;

/// Builds a fresh strategy instance.
pub type StrategyFactory = Arc<dyn Fn() -> Box<dyn Strategy> + Send + Sync>;

/// Public information about a registered strategy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    /// Registration order, used as the seat index in schedules
    pub id: usize,
    pub name: String,
    /// Free-form provenance (author, file, builtin description)
    pub source: String,
}

struct Entry {
    descriptor: StrategyDescriptor,
    factory: StrategyFactory,
}

#[derive(Default)]
pub struct StrategyRegistry {
    entries: Vec<Entry>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with every builtin strategy under its id.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for base in StrategyBase::ALL {
            let strategy = BuiltinStrategy::new(base);
            registry.insert(
                base.id().to_string(),
                describe_strategy(&strategy),
                builtin_factory(strategy),
            );
        }
        registry
    }

    /// Register a strategy factory under a unique, non-empty name.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
        factory: F,
    ) -> Result<usize, ConfigurationError>
    where
        F: Fn() -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyStrategyName);
        }
        if self.index_of(&name).is_some() {
            return Err(ConfigurationError::DuplicateStrategy(name));
        }
        Ok(self.insert(name, source.into(), Arc::new(factory)))
    }

    pub fn register_builtin(
        &mut self,
        name: impl Into<String>,
        strategy: BuiltinStrategy,
    ) -> Result<usize, ConfigurationError> {
        let source = describe_strategy(&strategy);
        let factory = builtin_factory(strategy);
        self.register(name, source, move || factory())
    }

    /// Validate and register a bytecode program.
    pub fn register_bytecode(
        &mut self,
        name: impl Into<String>,
        code: Vec<u8>,
    ) -> Result<usize, ConfigurationError> {
        let name = name.into();
        let program = match BytecodeStrategy::new(code) {
            Ok(program) => program,
            Err(source) => return Err(ConfigurationError::InvalidBytecode { name, source }),
        };
        let source = format!("bytecode ({} bytes)", program.code().len());
        self.register(name, source, move || Box::new(program.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &StrategyDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn get(&self, id: usize) -> Option<&StrategyDescriptor> {
        self.entries.get(id).map(|e| &e.descriptor)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.descriptor.name == name)
    }

    /// Look a strategy up by name.
    pub fn lookup(&self, name: &str) -> Result<&StrategyDescriptor, ConfigurationError> {
        self.index_of(name)
            .and_then(|id| self.get(id))
            .ok_or_else(|| ConfigurationError::UnknownStrategy(name.to_string()))
    }

    /// A fresh instance of strategy `id`.
    pub fn instantiate(&self, id: usize) -> Option<Box<dyn Strategy>> {
        self.entries.get(id).map(|e| (e.factory)())
    }

    /// A fresh instance of strategy `id`, seated under its name.
    pub fn seat(&self, id: usize) -> Option<Seat> {
        let entry = self.entries.get(id)?;
        Some(Seat::boxed(entry.descriptor.name.as_str(), (entry.factory)()))
    }

    fn insert(&mut self, name: String, source: String, factory: StrategyFactory) -> usize {
        let id = self.entries.len();
        self.entries.push(Entry {
            descriptor: StrategyDescriptor { id, name, source },
            factory,
        });
        id
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.descriptor))
            .finish()
    }
}

fn builtin_factory(strategy: BuiltinStrategy) -> StrategyFactory {
    Arc::new(move || -> Box<dyn Strategy> { Box::new(strategy.player()) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::error::StrategyError;
    use crate::history::{HistoryView, PlayerId};
    use crate::random::SeededRng;
    use crate::strategy::{strategy_fn, Action, DecisionContext, StrategyParams};
    use crate::vm::op;

    fn decide_first_round(strategy: &mut dyn Strategy) -> Result<Action, StrategyError> {
        let ctx = DecisionContext {
            round_index: 0,
            config: GameConfig::new(3, 2.0, 5).unwrap(),
            my_id: PlayerId(0),
            history: HistoryView::empty(),
        };
        strategy.decide(&ctx, &mut SeededRng::new(1, 0))
    }

    #[test]
    fn test_with_builtins() {
        let registry = StrategyRegistry::with_builtins();
        assert_eq!(registry.len(), StrategyBase::ALL.len());
        for (id, base) in StrategyBase::ALL.iter().enumerate() {
            let descriptor = registry.lookup(base.id()).unwrap();
            assert_eq!(descriptor.id, id);
        }
    }

    #[test]
    fn test_register_and_instantiate() {
        let mut registry = StrategyRegistry::new();
        let id = registry
            .register("always_c", "test", || {
                Box::new(strategy_fn(|_ctx, _rng| Ok(Action::Cooperate)))
            })
            .unwrap();
        assert_eq!(id, 0);

        let mut strategy = registry.instantiate(id).unwrap();
        assert_eq!(decide_first_round(&mut strategy), Ok(Action::Cooperate));
        assert!(registry.instantiate(1).is_none());

        let seat = registry.seat(id).unwrap();
        assert_eq!(seat.name(), "always_c");
    }

    #[test]
    fn test_duplicate_and_empty_names() {
        let mut registry = StrategyRegistry::with_builtins();
        let err = registry
            .register_builtin("GrimTrigger", BuiltinStrategy::new(StrategyBase::GrimTrigger))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateStrategy("GrimTrigger".into()));

        let err = registry
            .register_builtin("  ", BuiltinStrategy::new(StrategyBase::GrimTrigger))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyStrategyName);
    }

    #[test]
    fn test_unknown_lookup() {
        let registry = StrategyRegistry::with_builtins();
        assert_eq!(
            registry.lookup("nope"),
            Err(ConfigurationError::UnknownStrategy("nope".into()))
        );
    }

    #[test]
    fn test_parameterized_builtin() {
        let mut registry = StrategyRegistry::new();
        let params = StrategyParams {
            cooperate_bias: 100,
            ..Default::default()
        };
        let id = registry
            .register_builtin(
                "always_heads",
                BuiltinStrategy::with_params(StrategyBase::Random, params),
            )
            .unwrap();
        let mut strategy = registry.instantiate(id).unwrap();
        assert_eq!(decide_first_round(&mut strategy), Ok(Action::Cooperate));
    }

    #[test]
    fn test_register_bytecode() {
        let mut registry = StrategyRegistry::new();
        let id = registry.register_bytecode("defector", vec![op::DEFECT]).unwrap();
        let mut strategy = registry.instantiate(id).unwrap();
        assert_eq!(decide_first_round(&mut strategy), Ok(Action::Defect));

        let err = registry.register_bytecode("broken", vec![0xFF]).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidBytecode { ref name, .. } if name == "broken"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_instances_are_independent() {
        let registry = StrategyRegistry::with_builtins();
        let id = registry.index_of("Gradual").unwrap();
        let a = registry.instantiate(id);
        let b = registry.instantiate(id);
        assert!(a.is_some() && b.is_some());
    }
}
