//! Tests for the devirtualization pipeline
//!
//! Devirtualization converts virtual method calls to direct function calls
//! when every class reaching the receiver dispatches to the same method.

use cidopt_core::bound::{Expr, FunctionId, LocalId, Program, Stmt};
use cidopt_core::config::OptimizationLevel;
use cidopt_core::diagnostics::Subject;
use cidopt_core::optimizer::devirtualization::{
    build_flow_graph, propagate, CallDecision, DevirtualizationPass, KeepReason, UnitReport,
    VarOrigin,
};
use cidopt_test_helpers::compile::{bind, optimize, optimize_with_handler, optimize_with_level};
use cidopt_test_helpers::fixtures::{conditional_construction, exported_entry, single_construction};
use cidopt_test_helpers::mocks::MockDiagnosticHandler;
use indoc::indoc;

fn run(program: &Program, unit: usize) -> UnitReport {
    DevirtualizationPass::new(&program.lattice, &program.functions)
        .run(&program.units[unit])
        .unwrap()
}

fn function(program: &Program, name: &str) -> FunctionId {
    program.functions.lookup(name).unwrap()
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_single_construction_devirtualizes() {
    let program = bind(single_construction());
    let mut graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);
    propagate(&mut graph);

    let derived = program.lattice.lookup("Derived").unwrap();
    let site = &graph.call_sites()[0];
    let receiver = graph.node(site.receiver);
    assert_eq!(receiver.reaching.len(), 1);
    assert!(receiver.reaching.contains(&derived));

    let report = run(&program, 0);
    assert_eq!(report.devirtualized, 1);
    assert_eq!(
        report.decisions[0].decision,
        CallDecision::Devirtualize {
            target: function(&program, "Derived.virtualMethod")
        }
    );
}

#[test]
fn test_conditional_construction_keeps_virtual() {
    let program = bind(conditional_construction());
    let mut graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);
    propagate(&mut graph);

    let receiver = graph.node(graph.call_sites()[0].receiver);
    let mut reaching: Vec<&str> = receiver
        .reaching
        .iter()
        .map(|&c| program.lattice.name(c))
        .collect();
    reaching.sort_unstable();
    assert_eq!(reaching, vec!["Derived1", "Derived2"]);

    let report = run(&program, 0);
    assert_eq!(report.kept, 1);
    assert_eq!(
        report.decisions[0].decision,
        CallDecision::KeepVirtual {
            reason: KeepReason::Polymorphic {
                targets: vec![
                    function(&program, "Derived1.virtualMethod"),
                    function(&program, "Derived2.virtualMethod"),
                ]
            }
        }
    );
}

#[test]
fn test_inherited_implementation_is_shared() {
    // Both classes inherit `Base.run`, so two reaching classes still have one target
    let program = bind(indoc! {r#"
        classes:
          - name: Base
            methods:
              - name: run
                function: Base.run
          - name: Left
            base: Base
          - name: Right
            base: Base
        functions:
          - name: Base.run
            owner: Base
          - name: main
            body:
              - kind: let
                name: x
                init:
                  kind: conditional
                  cond: { kind: literal }
                  then: { kind: new, class: Left }
                  else: { kind: new, class: Right }
              - kind: expr
                value:
                  kind: virtual_call
                  receiver: { kind: local, name: x }
                  method: run
                  declaring: Base
        units:
          - name: main
            functions: [main]
    "#});
    let report = run(&program, 0);
    assert_eq!(
        report.decisions[0].decision.target(),
        Some(function(&program, "Base.run"))
    );
}

// ============================================================================
// Conservative cases
// ============================================================================

#[test]
fn test_exported_parameter_keeps_virtual() {
    let program = bind(exported_entry());
    let report = run(&program, 0);
    assert_eq!(
        report.decisions[0].decision,
        CallDecision::KeepVirtual {
            reason: KeepReason::OpenReceiver
        }
    );
}

#[test]
fn test_unreachable_receiver_keeps_virtual() {
    let program = bind(indoc! {r#"
        classes:
          - name: Shape
            kind: abstract
            methods:
              - name: area
        functions:
          - name: main
            body:
              - kind: let
                name: s
                init: { kind: "null" }
              - kind: expr
                value:
                  kind: virtual_call
                  receiver: { kind: local, name: s }
                  method: area
                  declaring: Shape
        units:
          - name: main
            functions: [main]
    "#});
    let report = run(&program, 0);
    assert_eq!(
        report.decisions[0].decision,
        CallDecision::KeepVirtual {
            reason: KeepReason::Unreachable
        }
    );
}

#[test]
fn test_object_through_helper_and_field() {
    // new Impl -> helper(p) -> return p -> holder.item -> item.work()
    let program = bind(indoc! {r#"
        classes:
          - name: Job
            kind: interface
            methods:
              - name: work
          - name: Impl
            implements: [Job]
            methods:
              - name: work
                function: Impl.work
          - name: Holder
            polymorphic: true
            fields:
              - name: item
                private: true
        functions:
          - name: Impl.work
            owner: Impl
          - name: identity
            params: [p]
            body:
              - kind: return
                value: { kind: local, name: p }
          - name: Holder.run
            owner: Holder
            body:
              - kind: expr
                value:
                  kind: store
                  object: { kind: this }
                  owner: Holder
                  field: item
                  value:
                    kind: call
                    function: identity
                    args: [{ kind: new, class: Impl }]
              - kind: expr
                value:
                  kind: virtual_call
                  receiver:
                    kind: field
                    object: { kind: this }
                    owner: Holder
                    field: item
                  method: work
                  declaring: Job
        units:
          - name: main
            functions: [Holder.run, identity, Impl.work]
    "#});
    let report = run(&program, 0);
    assert_eq!(
        report.decisions[0].decision.target(),
        Some(function(&program, "Impl.work"))
    );
}

#[test]
fn test_public_field_keeps_virtual() {
    let program = bind(indoc! {r#"
        classes:
          - name: Job
            kind: interface
            methods:
              - name: work
          - name: Impl
            implements: [Job]
            methods:
              - name: work
                function: Impl.work
          - name: Holder
            polymorphic: true
            fields:
              - name: item
        functions:
          - name: Impl.work
            owner: Impl
          - name: Holder.run
            owner: Holder
            body:
              - kind: expr
                value:
                  kind: store
                  object: { kind: this }
                  owner: Holder
                  field: item
                  value: { kind: new, class: Impl }
              - kind: expr
                value:
                  kind: virtual_call
                  receiver:
                    kind: field
                    object: { kind: this }
                    owner: Holder
                    field: item
                  method: work
                  declaring: Job
        units:
          - name: main
            functions: [Holder.run, Impl.work]
    "#});
    let report = run(&program, 0);
    assert_eq!(
        report.decisions[0].decision,
        CallDecision::KeepVirtual {
            reason: KeepReason::OpenReceiver
        }
    );
}

#[test]
fn test_call_into_other_unit_keeps_virtual() {
    let program = bind(indoc! {r#"
        classes:
          - name: Base
            methods:
              - name: go
                function: Base.go
        functions:
          - name: Base.go
            owner: Base
          - name: make
            body:
              - kind: return
                value: { kind: new, class: Base }
          - name: main
            body:
              - kind: expr
                value:
                  kind: virtual_call
                  receiver: { kind: call, function: make }
                  method: go
                  declaring: Base
        units:
          - name: main
            functions: [main]
          - name: factory
            functions: [make, Base.go]
    "#});
    let main = run(&program, 0);
    assert_eq!(
        main.decisions[0].decision,
        CallDecision::KeepVirtual {
            reason: KeepReason::OpenReceiver
        }
    );
    let factory = run(&program, 1);
    assert!(factory.decisions.is_empty());
}

#[test]
fn test_helper_called_from_other_unit_keeps_virtual() {
    // `lib` only ever passes a Y, but `app` hands the same helper an X
    let yaml = indoc! {r#"
        classes:
          - name: Base
            kind: abstract
            methods:
              - name: run
          - name: X
            base: Base
            methods:
              - name: run
                function: X.run
          - name: Y
            base: Base
            methods:
              - name: run
                function: Y.run
        functions:
          - name: X.run
            owner: X
          - name: Y.run
            owner: Y
          - name: helper
            params: [p]
            body:
              - kind: expr
                value:
                  kind: virtual_call
                  receiver: { kind: local, name: p }
                  method: run
                  declaring: Base
          - name: libmain
            body:
              - kind: expr
                value:
                  kind: call
                  function: helper
                  args: [{ kind: new, class: Y }]
          - name: main
            body:
              - kind: expr
                value:
                  kind: call
                  function: helper
                  args: [{ kind: new, class: X }]
        units:
          - name: lib
            functions: [helper, libmain, X.run, Y.run]
          - name: app
            functions: [main]
    "#};
    let program = bind(yaml);
    let lib = run(&program, 0);
    assert_eq!(
        lib.decisions[0].decision,
        CallDecision::KeepVirtual {
            reason: KeepReason::OpenReceiver
        }
    );

    let (program, report) = optimize_with_level(yaml, OptimizationLevel::O3).unwrap();
    assert_eq!(report.units[0].rewritten, 0);
    let helper = program.units[0].function(function(&program, "helper")).unwrap();
    assert!(matches!(helper.body[0], Stmt::Expr(Expr::VirtualCall { .. })));
}

#[test]
fn test_final_method_devirtualizes_exported_parameter() {
    let program = bind(indoc! {r#"
        classes:
          - name: Base
            methods:
              - name: id
                function: Base.id
                final: true
          - name: Derived
            base: Base
        functions:
          - name: Base.id
            owner: Base
          - name: api
            exported: true
            params: [p]
            body:
              - kind: expr
                value:
                  kind: virtual_call
                  receiver: { kind: local, name: p }
                  method: id
                  declaring: Base
        units:
          - name: main
            functions: [api]
    "#});
    let report = run(&program, 0);
    assert_eq!(
        report.decisions[0].decision.target(),
        Some(function(&program, "Base.id"))
    );
}

#[test]
fn test_cast_narrows_reaching_classes() {
    let program = bind(indoc! {r#"
        classes:
          - name: Base
            kind: abstract
            methods:
              - name: run
          - name: Left
            base: Base
            methods:
              - name: run
                function: Left.run
          - name: Right
            base: Base
            methods:
              - name: run
                function: Right.run
        functions:
          - name: Left.run
            owner: Left
          - name: Right.run
            owner: Right
          - name: main
            body:
              - kind: let
                name: x
                init:
                  kind: conditional
                  cond: { kind: literal }
                  then: { kind: new, class: Left }
                  else: { kind: new, class: Right }
              - kind: expr
                value:
                  kind: virtual_call
                  receiver: { kind: cast, value: { kind: local, name: x }, to: Left }
                  method: run
                  declaring: Base
        units:
          - name: main
            functions: [main]
    "#});
    let report = run(&program, 0);
    assert_eq!(
        report.decisions[0].decision.target(),
        Some(function(&program, "Left.run"))
    );
}

// ============================================================================
// Propagation
// ============================================================================

#[test]
fn test_propagation_reaches_fixed_point() {
    let program = bind(conditional_construction());
    let mut graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);

    let first = propagate(&mut graph);
    assert!(first.updates > 0);
    let snapshot: Vec<_> = graph.nodes().iter().map(|n| n.reaching.clone()).collect();

    let second = propagate(&mut graph);
    assert_eq!(second.updates, 0);
    let after: Vec<_> = graph.nodes().iter().map(|n| n.reaching.clone()).collect();
    assert_eq!(snapshot, after);
}

#[test]
fn test_local_nodes_are_per_function() {
    let program = bind(conditional_construction());
    let graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);
    let main = function(&program, "main");
    let locals: Vec<_> = graph
        .nodes()
        .iter()
        .filter(|n| matches!(n.origin, VarOrigin::Local { function, .. } if function == main))
        .collect();
    // `cond` and `x`
    assert_eq!(locals.len(), 2);
    assert!(graph
        .find(VarOrigin::Local {
            function: main,
            local: LocalId(1),
        })
        .is_some());
}

// ============================================================================
// Driver
// ============================================================================

#[test]
fn test_o3_rewrites_devirtualized_call() {
    let (program, report) =
        optimize_with_level(single_construction(), OptimizationLevel::O3).unwrap();
    assert_eq!(report.units[0].rewritten, 1);

    let main = &program.units[0].functions[0];
    match &main.body[1] {
        Stmt::Expr(Expr::Call {
            target, receiver, ..
        }) => {
            assert_eq!(*target, function(&program, "Derived.virtualMethod"));
            assert!(receiver.is_some());
        }
        other => panic!("expected direct call, got {:?}", other),
    }
}

#[test]
fn test_o2_reports_without_rewriting() {
    let (program, report) = optimize(single_construction()).unwrap();
    assert_eq!(report.optimization_level, OptimizationLevel::O2);
    assert_eq!(report.devirtualized(), 1);
    assert!(matches!(
        program.units[0].functions[0].body[1],
        Stmt::Expr(Expr::VirtualCall { .. })
    ));
}

#[test]
fn test_unresolvable_method_is_internal_error() {
    // `Odd` is a Base but neither it nor Base implements `go`
    let yaml = indoc! {r#"
        classes:
          - name: Base
            polymorphic: true
          - name: Odd
            base: Base
        functions:
          - name: main
            body:
              - kind: expr
                value:
                  kind: virtual_call
                  receiver: { kind: new, class: Odd }
                  method: go
                  declaring: Base
        units:
          - name: main
            functions: [main]
    "#};
    let handler = MockDiagnosticHandler::new();
    let err = optimize_with_handler(yaml, OptimizationLevel::O2, handler.clone()).unwrap_err();
    assert!(err.contains("internal error"));

    let messages = handler.messages_for(&Subject::CallSite {
        unit: "main".to_string(),
        site: 0,
    });
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("internal compiler error"));
}
