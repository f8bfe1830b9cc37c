//! End to end explorations over small dataflow graphs and fabrics.

use std::{collections::BTreeMap, fs, sync::Arc, thread, time::Duration};

use sylva_blueprints::{Encoding, ExplorationInput, ExplorationInputPaths, LoadError, SystemModelMessage};
use sylva_core::{
    fabric::FabricResourceModelBody, Actor, DataflowGraph, DesignSpecification, Edge,
    FabricResourceModel, Implementation, ImplementationCatalog, InfeasibilityKind, Metric,
    MetricRefiner, ResourceUnit, SearchStrategyKind, SolverOptions, SolverOptionsBuilder,
    SystemConstraint, SystemMetrics, SystemModel, SystemOptimizationObjective, TieBreak,
};
use sylva_orchestration::{engine_for, DseEngine, ExplorationReport, Termination};

fn init_logger() {
    let _logger = env_logger::builder().is_test(true).try_init();
}

fn minimize_area() -> DesignSpecification {
    DesignSpecification::new(
        vec![],
        vec![SystemOptimizationObjective::minimize("area", Metric::Area)],
    )
    .expect("valid specification")
}

fn options(strategy: SearchStrategyKind) -> SolverOptionsBuilder {
    let mut b = SolverOptionsBuilder::default();
    b.strategy(strategy);
    b
}

fn explore(
    graph: &DataflowGraph,
    catalog: &ImplementationCatalog,
    fabric: &FabricResourceModel,
    spec: &DesignSpecification,
    options: SolverOptions,
) -> ExplorationReport {
    DseEngine::init(
        graph.to_owned(),
        catalog.to_owned(),
        fabric.to_owned(),
        spec.to_owned(),
        options,
    )
    .expect("valid configuration")
    .run()
}

/// A -(2:1)-> B -(1:2)-> C
fn chain() -> (DataflowGraph, ImplementationCatalog) {
    let graph = DataflowGraph::new(
        vec![
            Actor::new("A").with_output("out", 2),
            Actor::new("B").with_input("in", 1).with_output("out", 1),
            Actor::new("C").with_input("in", 2),
        ],
        vec![
            Edge::new(("A", "out"), ("B", "in")),
            Edge::new(("B", "out"), ("C", "in")),
        ],
    )
    .expect("valid graph");
    let catalog = ImplementationCatalog::new(vec![
        Implementation::new("A_alu", "A", "alu").with_costs(2.0, 0.5, 2),
        Implementation::new("B_alu", "B", "alu").with_costs(1.0, 0.5, 1),
        Implementation::new("C_alu", "C", "alu").with_costs(3.0, 0.5, 2),
    ])
    .expect("valid catalog");
    (graph, catalog)
}

/// Four actors in a chain, each with three implementations of growing area
/// and shrinking latency.
fn pipeline() -> (DataflowGraph, ImplementationCatalog) {
    let ids = ["P", "Q", "R", "S"];
    let mut actors = Vec::new();
    let mut edges = Vec::new();
    let mut implementations = Vec::new();
    for (i, id) in ids.iter().copied().enumerate() {
        let mut a = Actor::new(id);
        if i > 0 {
            a = a.with_input("in", 1);
            edges.push(Edge::new((ids[i - 1], "out"), (id, "in")));
        }
        if i + 1 < ids.len() {
            a = a.with_output("out", 1);
        }
        actors.push(a);
        for (k, (area, latency)) in [(5.0, 1), (2.0 + i as f64, 2), (3.0, 4)].iter().enumerate() {
            implementations.push(
                Implementation::new(&format!("{}_{}", id, k), id, "alu")
                    .with_costs(*area, 1.0, *latency)
                    .with_energy(0.5 * (k + 1) as f64),
            );
        }
    }
    (
        DataflowGraph::new(actors, edges).expect("valid graph"),
        ImplementationCatalog::new(implementations).expect("valid catalog"),
    )
}

fn shared_unit() -> FabricResourceModel {
    FabricResourceModel::new(FabricResourceModelBody {
        units: vec![ResourceUnit::new("u0", "alu", 4)],
        links: vec![],
        max_hops: 1,
        intra_unit_delay: 1,
        inter_unit_delay: 1,
    })
    .expect("valid fabric")
}

#[test]
fn chain_is_scheduled_and_mapped_on_a_line() {
    init_logger();
    let (graph, catalog) = chain();
    let fabric = FabricResourceModel::grid(3, 1, "alu").expect("valid fabric");
    let report = explore(
        &graph,
        &catalog,
        &fabric,
        &minimize_area(),
        SolverOptions::default(),
    );
    assert_eq!(report.strategy, SearchStrategyKind::Exhaustive);
    assert_eq!(report.termination, Termination::Exhausted);
    assert_eq!(report.explored, 27);
    // only B in the middle keeps both channels at one hop
    assert_eq!(report.feasible, 2);
    assert_eq!(report.infeasible[&InfeasibilityKind::CapacityExceeded], 21);
    assert_eq!(report.infeasible[&InfeasibilityKind::AdjacencyViolated], 4);

    let best = report.best().expect("a feasible design");
    assert_eq!(best.model.candidate.choices, vec![0, 1, 2]);
    let expected: BTreeMap<String, u64> = [("A", 1), ("B", 2), ("C", 1)]
        .iter()
        .map(|(a, q)| (a.to_string(), *q))
        .collect();
    assert_eq!(best.model.repetition_vector, expected);
    assert_eq!(best.model.schedule.firings, vec!["A", "B", "B", "C"]);
    assert_eq!(best.model.schedule.buffer_bounds, vec![2, 2]);
    assert_eq!(best.metrics.area, 6.0);
    assert_eq!(best.metrics.buffer_tokens, 4);

    let message = report.to_message();
    let selected = &message.pareto_front[0];
    assert!(selected.check_against(&graph).is_ok());
    let bytes = selected.encode(Encoding::Cbor).expect("encodable");
    assert_eq!(
        &SystemModelMessage::decode(&bytes, Encoding::Cbor).expect("decodable"),
        selected
    );
}

#[test]
fn cycle_needs_a_delay_token() {
    init_logger();
    let build = |delay: u32| {
        DataflowGraph::new(
            vec![
                Actor::new("A").with_input("in", 1).with_output("out", 1),
                Actor::new("B").with_input("in", 1).with_output("out", 1),
            ],
            vec![
                Edge::new(("A", "out"), ("B", "in")),
                Edge::new(("B", "out"), ("A", "in")).with_initial_tokens(delay),
            ],
        )
        .expect("valid graph")
    };
    let catalog = ImplementationCatalog::new(vec![
        Implementation::new("A_alu", "A", "alu").with_costs(1.0, 1.0, 1),
        Implementation::new("B_alu", "B", "alu").with_costs(1.0, 1.0, 1),
    ])
    .expect("valid catalog");
    let fabric = FabricResourceModel::grid(2, 1, "alu").expect("valid fabric");

    let deadlocked = explore(
        &build(0),
        &catalog,
        &fabric,
        &minimize_area(),
        SolverOptions::default(),
    );
    assert_eq!(deadlocked.explored, 4);
    assert_eq!(deadlocked.feasible, 0);
    assert_eq!(deadlocked.infeasible[&InfeasibilityKind::DeadlockDetected], 4);
    assert!(deadlocked.pareto_front.is_empty());

    let live = explore(
        &build(1),
        &catalog,
        &fabric,
        &minimize_area(),
        SolverOptions::default(),
    );
    assert_eq!(live.feasible, 2);
    let best = live.best().expect("a feasible design");
    assert_eq!(best.model.schedule.firings, vec!["A", "B"]);
}

#[test]
fn only_available_unit_type_is_selected_regardless_of_weights() {
    init_logger();
    let graph = DataflowGraph::new(vec![Actor::new("F")], vec![]).expect("valid graph");
    let catalog = ImplementationCatalog::new(vec![
        Implementation::new("F_a", "F", "unitA").with_costs(10.0, 1.0, 1),
        Implementation::new("F_b", "F", "unitB").with_costs(5.0, 1.0, 1),
    ])
    .expect("valid catalog");
    let fabric = FabricResourceModel::new(FabricResourceModelBody {
        units: vec![ResourceUnit::new("b0", "unitB", 1)],
        links: vec![],
        max_hops: 1,
        intra_unit_delay: 1,
        inter_unit_delay: 1,
    })
    .expect("valid fabric");
    let objectives = [
        SystemOptimizationObjective::minimize("area", Metric::Area),
        SystemOptimizationObjective::maximize("area", Metric::Area).with_weight(3.0),
        SystemOptimizationObjective::minimize("power", Metric::Power).with_weight(0.25),
    ];
    for objective in objectives {
        let spec = DesignSpecification::new(vec![], vec![objective]).expect("valid specification");
        let report = explore(&graph, &catalog, &fabric, &spec, SolverOptions::default());
        assert_eq!(report.explored, 2);
        assert_eq!(report.feasible, 1);
        assert_eq!(report.infeasible[&InfeasibilityKind::CapacityExceeded], 1);
        let best = report.best().expect("a feasible design");
        assert_eq!(best.model.bindings[0].instances.len(), 1);
        assert_eq!(best.model.bindings[0].instances[0].implementation.name, "F_b");
        assert_eq!(best.model.bindings[0].instances[0].unit.as_deref(), Some("b0"));
    }
}

#[test]
fn contradictory_constraints_leave_no_feasible_design() {
    init_logger();
    let (graph, catalog) = chain();
    let fabric = FabricResourceModel::grid(3, 1, "alu").expect("valid fabric");
    let spec = DesignSpecification::new(
        vec![
            SystemConstraint::at_most("small", Metric::Area, 10.0),
            SystemConstraint::at_least("large", Metric::Area, 20.0),
        ],
        vec![SystemOptimizationObjective::minimize("area", Metric::Area)],
    )
    .expect("contradictions are not configuration errors");
    let report = explore(&graph, &catalog, &fabric, &spec, SolverOptions::default());
    assert_eq!(report.termination, Termination::Exhausted);
    assert_eq!(report.feasible, 0);
    assert_eq!(report.infeasible[&InfeasibilityKind::ConstraintViolated], 2);
    assert_eq!(report.infeasible_total(), report.explored);
    assert!(report.best().is_none());
    assert!(report.to_string().contains("constraint_violated: 2"));
}

#[test]
fn reevaluation_is_idempotent() {
    let (graph, catalog) = pipeline();
    let engine = DseEngine::init(
        graph,
        catalog,
        shared_unit(),
        minimize_area(),
        SolverOptions::default(),
    )
    .expect("valid configuration");
    let c = sylva_core::Candidate::new(vec![1, 2, 0, 1]);
    let first = engine.evaluate(&c).expect("inside the space");
    let second = engine.evaluate(&c).expect("inside the space");
    assert_eq!(first, second);
    assert_eq!(engine.run(), engine.run());
}

#[test]
fn worker_count_does_not_change_the_outcome() {
    init_logger();
    let (graph, catalog) = pipeline();
    let grid = FabricResourceModel::grid(2, 2, "alu").expect("valid fabric");
    let spec = DesignSpecification::new(
        vec![SystemConstraint::at_most("budget", Metric::Area, 14.0)],
        vec![
            SystemOptimizationObjective::minimize("area", Metric::Area),
            SystemOptimizationObjective::maximize("throughput", Metric::Throughput),
            SystemOptimizationObjective::minimize("energy", Metric::Energy).with_weight(0.5),
        ],
    )
    .expect("valid specification");
    let cases = [
        (SearchStrategyKind::Exhaustive, &grid, TieBreak::LowestChoice),
        (SearchStrategyKind::Exhaustive, &grid, TieBreak::HighestChoice),
    ];
    for (strategy, fabric, tie_break) in cases {
        let sequential = options(strategy)
            .tie_break(tie_break)
            .build()
            .expect("all fields have defaults");
        let parallel = options(strategy)
            .tie_break(tie_break)
            .workers(4)
            .batch_size(7)
            .build()
            .expect("all fields have defaults");
        let s = explore(&graph, &catalog, fabric, &spec, sequential);
        let p = explore(&graph, &catalog, fabric, &spec, parallel);
        assert_eq!(s.explored, 12usize.pow(4) as u64);
        assert!(s.feasible > 0);
        assert_eq!(s, p);
    }
    let unit = shared_unit();
    for strategy in [SearchStrategyKind::Greedy, SearchStrategyKind::RandomRestart] {
        let sequential = options(strategy)
            .seed(11)
            .build()
            .expect("all fields have defaults");
        let parallel = options(strategy)
            .seed(11)
            .workers(3)
            .batch_size(5)
            .build()
            .expect("all fields have defaults");
        assert_eq!(
            explore(&graph, &catalog, &unit, &spec, sequential),
            explore(&graph, &catalog, &unit, &spec, parallel)
        );
    }
}

#[test]
fn local_search_reaches_the_separable_optimum() {
    init_logger();
    let (graph, catalog) = pipeline();
    let fabric = shared_unit();
    let spec = minimize_area();
    let exhaustive = explore(
        &graph,
        &catalog,
        &fabric,
        &spec,
        options(SearchStrategyKind::Exhaustive)
            .build()
            .expect("all fields have defaults"),
    );
    let optimum = exhaustive.best().expect("a feasible design").score;
    // P_1 (2), Q_1 (3), R_2 (3), S_2 (3)
    assert_eq!(optimum, 11.0);
    for strategy in [SearchStrategyKind::Greedy, SearchStrategyKind::RandomRestart] {
        let report = explore(
            &graph,
            &catalog,
            &fabric,
            &spec,
            options(strategy)
                .restarts(2)
                .seed(5)
                .build()
                .expect("all fields have defaults"),
        );
        assert_eq!(report.strategy, strategy);
        assert_eq!(report.termination, Termination::Converged);
        assert!(report.explored <= exhaustive.explored);
        assert_eq!(report.best().map(|d| d.score), Some(optimum));
    }
}

#[test]
fn budgets_and_stalls_end_the_search() {
    let (graph, catalog) = pipeline();
    let fabric = shared_unit();
    let budgeted = explore(
        &graph,
        &catalog,
        &fabric,
        &minimize_area(),
        options(SearchStrategyKind::Exhaustive)
            .max_iterations(10)
            .batch_size(4)
            .build()
            .expect("all fields have defaults"),
    );
    assert_eq!(budgeted.termination, Termination::IterationBudget);
    assert_eq!(budgeted.explored, 10);

    let impossible = DesignSpecification::new(
        vec![SystemConstraint::at_most("nothing", Metric::Area, 0.0)],
        vec![SystemOptimizationObjective::minimize("area", Metric::Area)],
    )
    .expect("valid specification");
    let stalled = explore(
        &graph,
        &catalog,
        &fabric,
        &impossible,
        options(SearchStrategyKind::Exhaustive)
            .stall_limit(5)
            .workers(2)
            .batch_size(4)
            .build()
            .expect("all fields have defaults"),
    );
    assert_eq!(stalled.termination, Termination::Stalled);
    // the limit is crossed within the second generation, which is kept whole
    assert_eq!(stalled.explored, 8);
    assert_eq!(stalled.infeasible[&InfeasibilityKind::ConstraintViolated], 8);
}

/// Passes metrics through after holding the evaluating thread.
struct Slow(Duration);

impl MetricRefiner for Slow {
    fn unique_identifier(&self) -> String {
        "slow".to_string()
    }

    fn refine(&self, _model: &SystemModel, metrics: SystemMetrics) -> SystemMetrics {
        thread::sleep(self.0);
        metrics
    }
}

#[test]
fn time_limit_ends_the_search() {
    init_logger();
    let (graph, catalog) = pipeline();
    let engine = DseEngine::init(
        graph,
        catalog,
        shared_unit(),
        minimize_area(),
        options(SearchStrategyKind::Exhaustive)
            .time_limit_ms(50)
            .batch_size(1)
            .build()
            .expect("all fields have defaults"),
    )
    .expect("valid configuration")
    .with_refiner(Arc::new(Slow(Duration::from_millis(20))));
    let size = engine.search_space().size().expect("small space");
    assert_eq!(size, 81);
    let report = engine.run();
    assert_eq!(report.termination, Termination::TimeBudget);
    assert!(report.explored > 0);
    assert!(report.explored < size);
    assert_eq!(report.feasible + report.infeasible_total(), report.explored);
    assert!(report.best().is_some());
}

#[test]
fn effort_opens_parallel_instances() {
    init_logger();
    let (graph, catalog) = chain();
    let fabric = FabricResourceModel::grid(2, 2, "alu").expect("valid fabric");
    let spec = DesignSpecification::new(
        vec![],
        vec![SystemOptimizationObjective::minimize("latency", Metric::Latency)],
    )
    .expect("valid specification");
    let engine = |effort: u8| {
        DseEngine::init(
            graph.to_owned(),
            catalog.to_owned(),
            fabric.to_owned(),
            spec.to_owned(),
            options(SearchStrategyKind::Exhaustive)
                .effort(effort)
                .build()
                .expect("all fields have defaults"),
        )
        .expect("valid configuration")
    };
    let sequential = engine(10);
    assert_eq!(sequential.search_space().profiles(), &[vec![1, 1, 1]]);
    let parallel = engine(100);
    assert_eq!(parallel.search_space().profiles(), &[vec![1, 1, 1], vec![1, 2, 1]]);
    assert_eq!(parallel.search_space().size(), Some(4u64.pow(3) + 4u64.pow(4)));

    let slow = sequential.run().best().map(|d| d.metrics.latency);
    let report = parallel.run();
    let best = report.best().expect("a feasible design");
    assert_eq!(best.model.candidate.profile, 1);
    assert_eq!(best.model.bindings[1].instances.len(), 2);
    assert!(Some(best.metrics.latency) < slow);

    let message = report.to_message();
    let selected = &message.pareto_front[0];
    assert_eq!(selected.profile, 1);
    assert!(selected.check_against(&graph).is_ok());
    let bytes = selected.encode(Encoding::MsgPack).expect("encodable");
    assert_eq!(
        &SystemModelMessage::decode(&bytes, Encoding::MsgPack).expect("decodable"),
        selected
    );
}

#[test]
fn configuration_errors_stop_before_the_search() {
    let (graph, catalog) = pipeline();
    let missing = DseEngine::init(
        graph.to_owned(),
        catalog.to_owned(),
        FabricResourceModel::grid(2, 2, "dsp").expect("valid fabric"),
        minimize_area(),
        SolverOptions::default(),
    );
    assert!(matches!(
        missing.err(),
        Some(sylva_core::ConfigurationError::EmptySearchSpace(_))
    ));
    let zero_workers = DseEngine::init(
        graph,
        catalog,
        shared_unit(),
        minimize_area(),
        options(SearchStrategyKind::Exhaustive)
            .workers(0)
            .build()
            .expect("all fields have defaults"),
    );
    assert!(zero_workers.is_err());
}

#[test]
fn input_bundle_is_loaded_from_disk() {
    init_logger();
    let dir = std::env::temp_dir().join(format!("sylva-bundle-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("writable temp dir");
    let files = [
        (
            "graph.json",
            r#"{"actors": [
                {"id": "A", "ports": [{"name": "out", "direction": "output", "rate": 2}]},
                {"id": "B", "ports": [{"name": "in", "direction": "input", "rate": 1}]}
              ],
              "edges": [{"src": {"actor": "A", "port": "out"}, "dst": {"actor": "B", "port": "in"}}]}"#,
        ),
        (
            "catalog.json",
            r#"{"implementations": [
                {"name": "A0", "function": "A", "unit_type": "alu", "area": 1.0},
                {"name": "B0", "function": "B", "unit_type": "alu", "area": 2.0, "latency": 2}
              ]}"#,
        ),
        (
            "fabric.json",
            r#"{"units": [{"id": "u0", "unit_type": "alu"}, {"id": "u1", "unit_type": "alu"}],
               "links": [["u0", "u1"]]}"#,
        ),
        (
            "specification.json",
            r#"{"objectives": [{"id": "area", "metric": "area", "direction": "minimize"}]}"#,
        ),
        ("options.json", r#"{"strategy": "exhaustive", "workers": 2}"#),
        ("bad_options.json", r#"{"strategy": "exhaustive", "threads": 2}"#),
    ];
    for (name, content) in files {
        fs::write(dir.join(name), content).expect("writable temp dir");
    }
    let mut paths = ExplorationInputPaths {
        graph: dir.join("graph.json"),
        catalog: dir.join("catalog.json"),
        fabric: dir.join("fabric.json"),
        specification: dir.join("specification.json"),
        options: Some(dir.join("options.json")),
    };
    let input = ExplorationInput::load(&paths, 3).expect("valid bundle");
    let engine = engine_for(input).expect("valid configuration");
    let report = engine.run();
    assert_eq!(report.explored, 4);
    assert_eq!(report.feasible, 2);
    assert_eq!(report.best().map(|d| d.model.repetitions("B")), Some(2));

    paths.options = Some(dir.join("bad_options.json"));
    assert!(matches!(
        ExplorationInput::load(&paths, 3),
        Err(LoadError::Decode { .. })
    ));
    let _ = fs::remove_dir_all(&dir);
}
