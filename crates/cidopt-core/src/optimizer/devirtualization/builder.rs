//! Flow graph construction
//!
//! Walks every body of a unit once and records where object values come from
//! and where they go. Construction seeds a node with its class; everything
//! that moves a value (assignment, return, argument passing, conversion,
//! cast) becomes an edge. Virtual calls are registered as call sites and do
//! not touch any reaching set.
//!
//! Values the unit cannot see the producer of mark their node *open*:
//! parameters and `this` of functions callable from other units (exported,
//! dispatchable or directly called from elsewhere), results of calls into
//! bodies that live elsewhere, and fields other units may store into.

use super::graph::{TypePropagationGraph, VarId, VarOrigin, VirtualCallSite};
use crate::bound::{
    BoundFunction, CompilationUnit, Expr, FunctionId, FunctionTable, LocalId, MethodGroup, Place,
    Stmt,
};
use crate::lattice::{ClassLattice, FieldId};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

struct Frame {
    function: FunctionId,
    this: Option<VarId>,
    ret: VarId,
    params: Vec<VarId>,
    locals: FxHashMap<LocalId, VarId>,
    temps: u32,
}

pub struct FlowGraphBuilder<'a> {
    lattice: &'a ClassLattice,
    functions: &'a FunctionTable,
    unit: &'a CompilationUnit,
    graph: TypePropagationGraph,
    frames: Vec<Frame>,
    frame_of: FxHashMap<FunctionId, usize>,
    fields: FxHashMap<FieldId, VarId>,
    candidate_cache: FxHashMap<(String, u32), Vec<FunctionId>>,
}

impl<'a> FlowGraphBuilder<'a> {
    pub fn new(
        lattice: &'a ClassLattice,
        functions: &'a FunctionTable,
        unit: &'a CompilationUnit,
    ) -> Self {
        Self {
            lattice,
            functions,
            unit,
            graph: TypePropagationGraph::new(),
            frames: Vec::with_capacity(unit.functions.len()),
            frame_of: FxHashMap::default(),
            fields: FxHashMap::default(),
            candidate_cache: FxHashMap::default(),
        }
    }

    pub fn build(mut self) -> TypePropagationGraph {
        let unit = self.unit;
        let dispatchable = self.dispatchable_methods();

        // Frames first, so calls to functions defined later in the unit connect
        for function in &unit.functions {
            self.declare_frame(function, dispatchable.contains(&function.id));
        }
        for (frame, function) in unit.functions.iter().enumerate() {
            self.block(frame, &function.body);
        }

        debug!(
            "Built flow graph for unit '{}': {} nodes, {} edges, {} call sites",
            unit.name,
            self.graph.len(),
            self.graph.edge_count(),
            self.graph.call_sites().len()
        );
        self.graph
    }

    /// Functions reachable through virtual dispatch, possibly from other units
    fn dispatchable_methods(&self) -> FxHashSet<FunctionId> {
        self.lattice
            .iter()
            .flat_map(|(_, node)| node.methods.values().filter_map(|decl| decl.function))
            .collect()
    }

    fn declare_frame(&mut self, function: &BoundFunction, dispatchable: bool) {
        let id = function.id;
        let this = function
            .has_this
            .then(|| self.graph.add_node(VarOrigin::This { function: id }));
        let ret = self.graph.add_node(VarOrigin::Return { function: id });

        let mut locals =
            FxHashMap::with_capacity_and_hasher(function.local_count as usize, Default::default());
        let mut params = Vec::with_capacity(function.params.len());
        for &local in &function.params {
            let var = self.graph.add_node(VarOrigin::Local {
                function: id,
                local,
            });
            locals.insert(local, var);
            params.push(var);
        }

        if function.exported || dispatchable || self.functions.get(id).called_across_units {
            for &param in &params {
                self.graph.mark_open(param);
            }
            if let Some(this) = this {
                self.graph.mark_open(this);
            }
        }

        self.frame_of.insert(id, self.frames.len());
        self.frames.push(Frame {
            function: id,
            this,
            ret,
            params,
            locals,
            temps: 0,
        });
    }

    fn block(&mut self, frame: usize, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(frame, stmt);
        }
    }

    fn stmt(&mut self, frame: usize, stmt: &Stmt) {
        match stmt {
            Stmt::Let { local, init } => {
                let target = self.local(frame, *local);
                if let Some(value) = init.as_ref().and_then(|init| self.expr(frame, init)) {
                    self.graph.add_edge(value, target);
                }
            }
            Stmt::Expr(expr) => {
                self.expr(frame, expr);
            }
            Stmt::Return(value) => {
                if let Some(value) = value.as_ref().and_then(|value| self.expr(frame, value)) {
                    let ret = self.frames[frame].ret;
                    self.graph.add_edge(value, ret);
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(frame, cond);
                self.block(frame, then_branch);
                self.block(frame, else_branch);
            }
            Stmt::While { cond, body } => {
                self.expr(frame, cond);
                self.block(frame, body);
            }
            Stmt::Block(stmts) => self.block(frame, stmts),
        }
    }

    /// Node holding the value of `expr`, or `None` when it is not an object
    fn expr(&mut self, frame: usize, expr: &Expr) -> Option<VarId> {
        match expr {
            Expr::Literal | Expr::Null => None,
            Expr::Local(local) => Some(self.local(frame, *local)),
            Expr::This => self.frames[frame].this,
            Expr::New { class, ctor, args } => {
                let args = self.args(frame, args);
                let object = self.temp(frame);
                if self.lattice.get(*class).is_concrete() {
                    self.graph.seed(object, *class);
                }
                if let Some(ctor) = ctor {
                    self.connect_call(*ctor, Some(object), &args, None);
                }
                Some(object)
            }
            Expr::Assign { target, value } => {
                let value = self.expr(frame, value);
                let target = match target {
                    Place::Local(local) => self.local(frame, *local),
                    Place::Field { object, field } => {
                        self.expr(frame, object);
                        self.field(*field)
                    }
                };
                if let Some(value) = value {
                    self.graph.add_edge(value, target);
                }
                Some(target)
            }
            Expr::Field { object, field } => {
                self.expr(frame, object);
                Some(self.field(*field))
            }
            Expr::Call {
                target,
                receiver,
                args,
            } => {
                let receiver = receiver
                    .as_ref()
                    .and_then(|receiver| self.expr(frame, receiver));
                let args = self.args(frame, args);
                let result = self.temp(frame);
                if !self.connect_call(*target, receiver, &args, Some(result)) {
                    self.graph.mark_open(result);
                }
                Some(result)
            }
            Expr::VirtualCall {
                site,
                receiver,
                method,
                args,
            } => {
                let receiver = match self.expr(frame, receiver) {
                    Some(receiver) => receiver,
                    None => self.temp(frame),
                };
                let args = self.args(frame, args);
                let result = self.temp(frame);
                self.graph.add_call_site(VirtualCallSite {
                    site: *site,
                    receiver,
                    method: method.clone(),
                    function: self.frames[frame].function,
                });

                // Every implementation the hierarchy allows may run here
                let candidates = self.candidates(method);
                if candidates.is_empty() {
                    self.graph.mark_open(result);
                }
                for target in candidates {
                    if !self.connect_call(target, Some(receiver), &args, Some(result)) {
                        self.graph.mark_open(result);
                    }
                }
                Some(result)
            }
            Expr::Conditional {
                cond,
                then_value,
                else_value,
            } => {
                self.expr(frame, cond);
                let then_value = self.expr(frame, then_value);
                let else_value = self.expr(frame, else_value);
                if then_value.is_none() && else_value.is_none() {
                    return None;
                }
                let joined = self.temp(frame);
                for value in [then_value, else_value].into_iter().flatten() {
                    self.graph.add_edge(value, joined);
                }
                Some(joined)
            }
            Expr::Convert { value } => {
                let value = self.expr(frame, value)?;
                let converted = self.temp(frame);
                self.graph.add_edge(value, converted);
                Some(converted)
            }
            Expr::Cast { value, to } => {
                let value = self.expr(frame, value)?;
                let cast = self.temp(frame);
                // Objects failing the check never get past the cast
                let admitted = self.lattice.concrete_subtypes(*to).into_iter().collect();
                self.graph.restrict(cast, admitted);
                self.graph.add_edge(value, cast);
                Some(cast)
            }
            Expr::Binary { lhs, rhs } => {
                self.expr(frame, lhs);
                self.expr(frame, rhs);
                None
            }
        }
    }

    fn args(&mut self, frame: usize, args: &[Expr]) -> Vec<Option<VarId>> {
        args.iter().map(|arg| self.expr(frame, arg)).collect()
    }

    /// Wire a statically known call into the callee's frame.
    ///
    /// Returns `false` when the callee's body is not part of the unit.
    fn connect_call(
        &mut self,
        target: FunctionId,
        receiver: Option<VarId>,
        args: &[Option<VarId>],
        result: Option<VarId>,
    ) -> bool {
        let Some(&callee) = self.frame_of.get(&target) else {
            return false;
        };
        let callee = &self.frames[callee];
        let (this, ret) = (callee.this, callee.ret);
        let params = callee.params.clone();

        if let (Some(receiver), Some(this)) = (receiver, this) {
            self.graph.add_edge(receiver, this);
        }
        for (arg, param) in args.iter().zip(params) {
            if let Some(arg) = arg {
                self.graph.add_edge(*arg, param);
            }
        }
        if let Some(result) = result {
            self.graph.add_edge(ret, result);
        }
        true
    }

    /// Implementations `method` may dispatch to, over the whole hierarchy
    fn candidates(&mut self, method: &MethodGroup) -> Vec<FunctionId> {
        let key = (method.name.clone(), method.declaring.as_u32());
        if let Some(targets) = self.candidate_cache.get(&key) {
            return targets.clone();
        }
        let mut targets: Vec<FunctionId> = self
            .lattice
            .concrete_subtypes(method.declaring)
            .into_iter()
            .filter_map(|class| self.lattice.resolve_method(class, &method.name))
            .collect();
        targets.sort();
        targets.dedup();
        self.candidate_cache.insert(key, targets.clone());
        targets
    }

    fn local(&mut self, frame: usize, local: LocalId) -> VarId {
        let frame = &mut self.frames[frame];
        if let Some(&var) = frame.locals.get(&local) {
            return var;
        }
        let var = self.graph.add_node(VarOrigin::Local {
            function: frame.function,
            local,
        });
        frame.locals.insert(local, var);
        var
    }

    fn temp(&mut self, frame: usize) -> VarId {
        let frame = &mut self.frames[frame];
        let index = frame.temps;
        frame.temps += 1;
        self.graph.add_node(VarOrigin::Temp {
            function: frame.function,
            index,
        })
    }

    fn field(&mut self, field: FieldId) -> VarId {
        if let Some(&var) = self.fields.get(&field) {
            return var;
        }
        let var = self.graph.add_node(VarOrigin::Field { field });
        if self.field_escapes(field) {
            self.graph.mark_open(var);
        }
        self.fields.insert(field, var);
        var
    }

    /// A field other units can store into
    fn field_escapes(&self, field: FieldId) -> bool {
        let decl = self.lattice.field(field);
        !decl.is_private
            || self
                .functions
                .iter()
                .any(|(id, info)| {
                    info.owner == Some(decl.owner) && !self.frame_of.contains_key(&id)
                })
    }
}

/// Build the flow graph of `unit`
pub fn build_flow_graph(
    lattice: &ClassLattice,
    functions: &FunctionTable,
    unit: &CompilationUnit,
) -> TypePropagationGraph {
    FlowGraphBuilder::new(lattice, functions, unit).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bound::{Program, ProgramDescription};
    use indoc::indoc;

    fn bind(yaml: &str) -> Program {
        ProgramDescription::from_yaml(yaml).unwrap().bind().unwrap()
    }

    fn local_node(
        program: &Program,
        graph: &TypePropagationGraph,
        function: &str,
        local: u32,
    ) -> VarId {
        let function = program.functions.lookup(function).unwrap();
        graph
            .find(VarOrigin::Local {
                function,
                local: LocalId(local),
            })
            .unwrap()
    }

    const BASE: &str = indoc! {r#"
        classes:
          - name: Base
            methods:
              - name: run
                function: Base.run
          - name: Derived
            base: Base
            methods:
              - name: run
                function: Derived.run
        functions:
          - name: Base.run
            owner: Base
          - name: Derived.run
            owner: Derived
          - name: helper
            params: [p]
            body:
              - kind: return
                value: { kind: local, name: p }
          - name: main
            body:
              - kind: let
                name: x
                init: { kind: new, class: Derived }
              - kind: let
                name: y
                init:
                  kind: call
                  function: helper
                  args: [{ kind: local, name: x }]
              - kind: expr
                value:
                  kind: virtual_call
                  receiver: { kind: local, name: y }
                  method: run
                  declaring: Base
        units:
          - name: main
            functions: [main, helper, Base.run, Derived.run]
    "#};

    #[test]
    fn test_construction_seeds_temp() {
        let program = bind(BASE);
        let graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);
        let derived = program.lattice.lookup("Derived").unwrap();

        let seeded: Vec<_> = graph
            .nodes()
            .iter()
            .filter(|n| !n.reaching.is_empty())
            .collect();
        assert_eq!(seeded.len(), 1);
        assert!(seeded[0].reaching.contains(&derived));
        assert!(matches!(seeded[0].origin, VarOrigin::Temp { .. }));
    }

    #[test]
    fn test_direct_call_connects_param_and_return() {
        let program = bind(BASE);
        let graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);
        let helper = program.functions.lookup("helper").unwrap();

        let x = local_node(&program, &graph, "main", 0);
        let p = local_node(&program, &graph, "helper", 0);
        let ret = graph.find(VarOrigin::Return { function: helper }).unwrap();
        assert!(graph.node(x).edges.contains(&p));
        assert!(graph.node(p).edges.contains(&ret));
        assert!(!graph.node(p).open);
    }

    #[test]
    fn test_virtual_call_registers_site_on_receiver() {
        let program = bind(BASE);
        let graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);

        let y = local_node(&program, &graph, "main", 1);
        let sites: Vec<_> = graph.call_sites_on(y).collect();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].method.name, "run");
        assert!(graph.node(y).reaching.is_empty());
    }

    #[test]
    fn test_virtual_call_feeds_candidate_receivers() {
        let program = bind(BASE);
        let graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);
        let y = local_node(&program, &graph, "main", 1);

        for name in ["Base.run", "Derived.run"] {
            let function = program.functions.lookup(name).unwrap();
            let this = graph.find(VarOrigin::This { function }).unwrap();
            assert!(graph.node(y).edges.contains(&this), "{}", name);
            // Other units may dispatch to it
            assert!(graph.node(this).open);
        }
    }

    #[test]
    fn test_external_call_result_is_open() {
        let program = bind(indoc! {r#"
            classes:
              - name: A
                polymorphic: true
            functions:
              - name: make
              - name: main
                body:
                  - kind: let
                    name: a
                    init: { kind: call, function: make }
            units:
              - name: main
                functions: [main]
              - name: lib
                functions: [make]
        "#});
        let graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);
        let open: Vec<_> = graph.nodes().iter().filter(|n| n.open).collect();
        assert_eq!(open.len(), 1);
        assert!(matches!(open[0].origin, VarOrigin::Temp { .. }));
    }

    #[test]
    fn test_params_called_from_other_units_are_open() {
        let program = bind(indoc! {r#"
            functions:
              - name: helper
                params: [p]
              - name: caller
                body:
                  - kind: expr
                    value: { kind: call, function: helper, args: [{ kind: literal }] }
            units:
              - name: lib
                functions: [helper]
              - name: app
                functions: [caller]
        "#});
        let graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);
        assert!(local_node_is_open(&program, &graph, "helper", 0));
    }

    #[test]
    fn test_exported_params_are_open() {
        let program = bind(indoc! {r#"
            functions:
              - name: api
                exported: true
                params: [a, b]
        "#});
        let unit = CompilationUnit {
            name: "u".to_string(),
            functions: Vec::new(),
        };
        assert!(build_flow_graph(&program.lattice, &program.functions, &unit).is_empty());

        let program = bind(indoc! {r#"
            functions:
              - name: api
                exported: true
                params: [a, b]
            units:
              - name: u
                functions: [api]
        "#});
        let graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);
        assert!(local_node_is_open(&program, &graph, "api", 0));
        assert!(local_node_is_open(&program, &graph, "api", 1));
    }

    fn local_node_is_open(
        program: &Program,
        graph: &TypePropagationGraph,
        function: &str,
        local: u32,
    ) -> bool {
        graph.node(local_node(program, graph, function, local)).open
    }

    #[test]
    fn test_private_field_stays_closed() {
        let program = bind(indoc! {r#"
            classes:
              - name: Box
                polymorphic: true
                fields:
                  - name: secret
                    private: true
                  - name: shared
            functions:
              - name: Box.fill
                owner: Box
                body:
                  - kind: expr
                    value:
                      kind: store
                      object: { kind: this }
                      owner: Box
                      field: secret
                      value: { kind: new, class: Box }
                  - kind: expr
                    value:
                      kind: store
                      object: { kind: this }
                      owner: Box
                      field: shared
                      value: { kind: new, class: Box }
            units:
              - name: u
                functions: [Box.fill]
        "#});
        let graph = build_flow_graph(&program.lattice, &program.functions, &program.units[0]);
        let fields: Vec<_> = graph
            .nodes()
            .iter()
            .filter(|n| matches!(n.origin, VarOrigin::Field { .. }))
            .map(|n| n.open)
            .collect();
        assert_eq!(fields, vec![false, true]);
    }
}
