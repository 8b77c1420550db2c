//! Whole-program analysis shared by the per-unit passes
//!
//! The class lattice is encoded once, sequentially, before any unit is
//! optimized. The result is frozen behind `Arc` and shared read-only by the
//! parallel workers.

use crate::bound::{Expr, Place, Program, Stmt};
use crate::cache::CidCache;
use crate::errors::EncodeError;
use crate::lattice::{ClassId, ClassLattice, EncodingSummary, HierarchyEncoder, TrialDivision};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct WholeProgramAnalysis {
    /// Encoded lattice; `key`/`cid` are final
    pub lattice: Arc<ClassLattice>,
    pub encoding: EncodingSummary,
    /// Classes constructed by some unit
    pub live_classes: Arc<FxHashSet<ClassId>>,
}

impl WholeProgramAnalysis {
    /// Encode the program's lattice in place and collect the live classes.
    ///
    /// With a `prior` cache every class it names must keep its Cid; a
    /// conflict leaves the keys and Cids of `program.lattice` as they were.
    pub fn build(program: &mut Program, prior: Option<&CidCache>) -> Result<Self, EncodeError> {
        let primes = TrialDivision;
        let mut encoder = HierarchyEncoder::new(&primes);
        if let Some(prior) = prior {
            if !prior.matches_hierarchy(&program.lattice) {
                warn!("Class hierarchy changed since the cid cache was written");
            }
            encoder = encoder.with_prior(prior);
        }
        let encoding = encoder.encode_program(&mut program.lattice)?;

        let mut live_classes = FxHashSet::default();
        for function in program.units.iter().flat_map(|u| u.functions.iter()) {
            collect_in_block(&function.body, &mut live_classes);
        }
        info!(
            "Whole-program analysis: {} encoded classes, {} instantiated",
            encoding.classes,
            live_classes.len()
        );

        Ok(Self {
            lattice: Arc::new(program.lattice.clone()),
            encoding,
            live_classes: Arc::new(live_classes),
        })
    }
}

fn collect_in_block(stmts: &[Stmt], live: &mut FxHashSet<ClassId>) {
    for stmt in stmts {
        match stmt {
            Stmt::Let { init, .. } => {
                if let Some(init) = init {
                    collect_in_expr(init, live);
                }
            }
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => collect_in_expr(expr, live),
            Stmt::Return(None) => {}
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                collect_in_expr(cond, live);
                collect_in_block(then_branch, live);
                collect_in_block(else_branch, live);
            }
            Stmt::While { cond, body } => {
                collect_in_expr(cond, live);
                collect_in_block(body, live);
            }
            Stmt::Block(body) => collect_in_block(body, live),
        }
    }
}

fn collect_in_expr(expr: &Expr, live: &mut FxHashSet<ClassId>) {
    match expr {
        Expr::Literal | Expr::Null | Expr::Local(_) | Expr::This => {}
        Expr::New { class, args, .. } => {
            live.insert(*class);
            args.iter().for_each(|arg| collect_in_expr(arg, live));
        }
        Expr::Assign { target, value } => {
            if let Place::Field { object, .. } = target {
                collect_in_expr(object, live);
            }
            collect_in_expr(value, live);
        }
        Expr::Field { object, .. } => collect_in_expr(object, live),
        Expr::Call { receiver, args, .. } => {
            if let Some(receiver) = receiver {
                collect_in_expr(receiver, live);
            }
            args.iter().for_each(|arg| collect_in_expr(arg, live));
        }
        Expr::VirtualCall { receiver, args, .. } => {
            collect_in_expr(receiver, live);
            args.iter().for_each(|arg| collect_in_expr(arg, live));
        }
        Expr::Conditional {
            cond,
            then_value,
            else_value,
        } => {
            collect_in_expr(cond, live);
            collect_in_expr(then_value, live);
            collect_in_expr(else_value, live);
        }
        Expr::Convert { value } | Expr::Cast { value, .. } => collect_in_expr(value, live),
        Expr::Binary { lhs, rhs } => {
            collect_in_expr(lhs, live);
            collect_in_expr(rhs, live);
        }
    }
}
