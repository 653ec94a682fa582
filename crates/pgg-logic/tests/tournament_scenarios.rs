use pgg_logic::{
    payoff, run_match, strategy_fn, Action, BuiltinStrategy, Composition, FaultReason,
    GameConfig, MatchSettings, Seat, StrategyBase, StrategyError, StrategyParams,
    StrategyRegistry, Tournament, TournamentConfig,
};

fn builtin(base: StrategyBase) -> Seat {
    Seat::new(base.id(), BuiltinStrategy::new(base).player())
}

fn with_history() -> MatchSettings {
    MatchSettings {
        keep_history: true,
        ..Default::default()
    }
}

#[test]
fn two_defectors_each_earn_one() {
    let config = GameConfig::new(2, 1.5, 1).unwrap();
    let outcome = run_match(
        0,
        config,
        vec![builtin(StrategyBase::AlwaysDefect), builtin(StrategyBase::AlwaysDefect)],
        0,
        MatchSettings::default(),
    )
    .unwrap();
    assert_eq!(outcome.scores, vec![1.0, 1.0]);
}

#[test]
fn two_cooperators_each_earn_k() {
    let config = GameConfig::new(2, 1.5, 1).unwrap();
    let outcome = run_match(
        0,
        config,
        vec![
            builtin(StrategyBase::AlwaysCooperate),
            builtin(StrategyBase::AlwaysCooperate),
        ],
        0,
        MatchSettings::default(),
    )
    .unwrap();
    assert_eq!(outcome.scores, vec![1.5, 1.5]);
}

#[test]
fn lone_defector_among_three() {
    let config = GameConfig::new(3, 2.0, 1).unwrap();
    let outcome = run_match(
        0,
        config,
        vec![
            builtin(StrategyBase::AlwaysCooperate),
            builtin(StrategyBase::AlwaysCooperate),
            builtin(StrategyBase::AlwaysDefect),
        ],
        0,
        MatchSettings::default(),
    )
    .unwrap();

    let expected = [4.0 / 3.0, 4.0 / 3.0, 7.0 / 3.0];
    for (got, want) in outcome.scores.iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "{} != {}", got, want);
    }
    assert_eq!(
        payoff(&config, &[Action::Cooperate, Action::Cooperate, Action::Defect]).unwrap(),
        outcome.scores
    );
}

#[test]
fn free_rider_never_earns_less_than_a_cooperator() {
    let config = GameConfig::new(6, 2.0, 10).unwrap();
    let opponents = [
        StrategyBase::AlwaysCooperate,
        StrategyBase::ConditionalCooperator,
        StrategyBase::Random,
        StrategyBase::Pavlov,
        StrategyBase::Gradual,
        StrategyBase::EndgameDefector,
        StrategyBase::PatientConditional,
        StrategyBase::SuspiciousConditional,
    ];

    for (seed, window) in opponents.windows(5).enumerate() {
        let mut seats = vec![builtin(StrategyBase::AlwaysDefect)];
        seats.extend(window.iter().map(|b| builtin(*b)));

        let outcome = run_match(seed as u64, config, seats, seed as u64, with_history()).unwrap();
        for record in outcome.history.unwrap() {
            let reference = record.payoffs()[0];
            assert_eq!(record.actions()[0], Action::Defect);
            for (action, p) in record.actions().iter().zip(record.payoffs()).skip(1) {
                match action {
                    Action::Cooperate => assert!(reference > *p),
                    Action::Defect => assert_eq!(reference, *p),
                }
            }
        }
    }
}

#[test]
fn strategy_failing_in_round_five_defects_once() {
    let config = GameConfig::new(2, 1.5, 10).unwrap();
    // Fifth round is round index 4
    let flaky = strategy_fn(|ctx, _rng| {
        if ctx.round_index == 4 {
            return Err(StrategyError::Failed("lost my notes".into()));
        }
        Ok(Action::Cooperate)
    });
    let outcome = run_match(
        3,
        config,
        vec![Seat::new("flaky", flaky), builtin(StrategyBase::AlwaysCooperate)],
        9,
        with_history(),
    )
    .unwrap();

    let history = outcome.history.unwrap();
    assert_eq!(history.len(), 10);
    for record in &history {
        assert_eq!(record.actions().len(), 2);
        let expected = if record.round_index() == 4 {
            Action::Defect
        } else {
            Action::Cooperate
        };
        assert_eq!(record.actions()[0], expected);
    }

    assert_eq!(outcome.faults.len(), 1);
    assert_eq!(outcome.faults[0].round, 4);
    assert_eq!(outcome.faults[0].strategy_name, "flaky");
}

fn arena_registry() -> StrategyRegistry {
    let mut registry = StrategyRegistry::with_builtins();
    registry
        .register_builtin(
            "ForgivingConditional",
            BuiltinStrategy::with_params(
                StrategyBase::ConditionalCooperator,
                StrategyParams {
                    forgiveness: 30,
                    threshold: 60,
                    ..Default::default()
                },
            ),
        )
        .unwrap();
    // Grim trigger in bytecode: defect once anyone else ever defected
    registry
        .register_bytecode(
            "BytecodeGrim",
            vec![0x06, 0x01, 0x00, 0x0D, 0x18],
        )
        .unwrap();
    registry
}

#[test]
fn identical_seeds_give_byte_identical_results() {
    let run = |workers| {
        let config = TournamentConfig {
            n: 4,
            k: 2.0,
            r: 12,
            repetitions_per_group: 2,
            composition: Composition::RoundRobin,
            seed: 77,
            workers: Some(workers),
            ..Default::default()
        };
        let result = Tournament::new(config, arena_registry()).unwrap().run().unwrap();
        serde_json::to_vec(&result).unwrap()
    };

    let first = run(3);
    assert_eq!(first, run(3));
    assert_eq!(first, run(1));
}

#[test]
fn different_seeds_can_change_random_play() {
    let run = |seed| {
        let config = TournamentConfig {
            n: 3,
            k: 2.0,
            r: 20,
            composition: Composition::RandomSample,
            sample_groups: 30,
            seed,
            ..Default::default()
        };
        let result = Tournament::new(config, StrategyRegistry::with_builtins())
            .unwrap()
            .run()
            .unwrap();
        serde_json::to_string(&result).unwrap()
    };
    assert_ne!(run(1), run(2));
}

#[test]
fn always_failing_strategy_still_gets_full_scores() {
    let mut registry = StrategyRegistry::with_builtins();
    registry
        .register("Broken", "test", || {
            Box::new(strategy_fn(|_ctx, _rng| {
                Err(StrategyError::Failed("always broken".into()))
            }))
        })
        .unwrap();
    registry
        .register("Panicky", "test", || {
            Box::new(strategy_fn(|_ctx, _rng| panic!("never decides")))
        })
        .unwrap();

    let config = TournamentConfig {
        n: 3,
        k: 2.0,
        r: 5,
        composition: Composition::AllVsOne,
        seed: 5,
        max_faults_per_seat: Some(2),
        ..Default::default()
    };
    let tournament = Tournament::new(config, registry).unwrap();
    let expected_matches = tournament.match_count();
    let result = tournament.run().unwrap();

    assert_eq!(result.matches_played, expected_matches);
    assert_eq!(result.standings.len(), 12);
    for standing in &result.standings {
        assert!(standing.matches_played > 0, "{} never played", standing.name);
        assert_eq!(standing.rounds_played, standing.matches_played * 5);
    }

    for name in ["Broken", "Panicky"] {
        let standing = result.standing(name).unwrap();
        assert!(standing.faults > 0);
        assert!(standing.total_payoff > 0.0);
    }
    assert!(result
        .faults
        .iter()
        .any(|f| matches!(f.reason, FaultReason::Panicked { .. })));
    assert!(result
        .faults
        .iter()
        .any(|f| matches!(f.reason, FaultReason::Quarantined { faults: 2 })));

    // Healthy strategies are unaffected
    assert_eq!(result.standing("AlwaysDefect").unwrap().faults, 0);
}

#[test]
fn free_riders_lead_against_unconditional_cooperators() {
    let mut registry = StrategyRegistry::new();
    registry
        .register_builtin("defector", BuiltinStrategy::new(StrategyBase::AlwaysDefect))
        .unwrap();
    registry
        .register_builtin("saint", BuiltinStrategy::new(StrategyBase::AlwaysCooperate))
        .unwrap();

    let config = TournamentConfig {
        n: 6,
        k: 2.0,
        r: 10,
        composition: Composition::AllVsOne,
        ..Default::default()
    };
    let result = Tournament::new(config, registry).unwrap().run().unwrap();

    assert_eq!(result.standings[0].name, "defector");
    assert_eq!(result.standings[0].rank, 1);
    assert!(result.standings[0].mean_payoff > result.standings[1].mean_payoff);
}

#[test]
fn json_config_drives_a_tournament() {
    let config = TournamentConfig::from_json(
        r#"{"n": 3, "k": 2.5, "r": 8, "composition": "random_sample",
            "sample_groups": 12, "seed": 11, "keep_histories": true}"#,
    )
    .unwrap();
    let tournament = Tournament::new(config, StrategyRegistry::with_builtins()).unwrap();
    assert_eq!(tournament.match_count(), 12);

    let (_, outcome) = tournament.play_match(0).unwrap();
    assert_eq!(outcome.history.map(|h| h.len()), Some(8));
}
