use crate::bound::{CallSiteId, CompilationUnit, Expr, FunctionId, Place, Stmt};
use crate::optimizer::devirtualization::Resolution;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Rewrites devirtualized call sites into direct calls with the receiver as
/// first operand, so the code generator emits no table lookup for them
pub struct MethodToFunctionConversionPass {
    targets: FxHashMap<CallSiteId, FunctionId>,
}

impl MethodToFunctionConversionPass {
    pub fn new(decisions: &[Resolution]) -> Self {
        let targets = decisions
            .iter()
            .filter_map(|r| r.decision.target().map(|target| (r.site, target)))
            .collect();
        Self { targets }
    }

    /// Returns the number of rewritten call sites
    pub fn run(&self, unit: &mut CompilationUnit) -> usize {
        if self.targets.is_empty() {
            return 0;
        }
        let mut converted = 0;
        for function in &mut unit.functions {
            converted += self.convert_in_block(&mut function.body);
        }
        debug!("Converted {} virtual calls in unit '{}'", converted, unit.name);
        converted
    }

    fn convert_in_block(&self, stmts: &mut [Stmt]) -> usize {
        stmts.iter_mut().map(|s| self.convert_in_statement(s)).sum()
    }

    fn convert_in_statement(&self, stmt: &mut Stmt) -> usize {
        match stmt {
            Stmt::Let { init, .. } => init.as_mut().map_or(0, |e| self.convert_in_expression(e)),
            Stmt::Expr(expr) => self.convert_in_expression(expr),
            Stmt::Return(value) => value.as_mut().map_or(0, |e| self.convert_in_expression(e)),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.convert_in_expression(cond)
                    + self.convert_in_block(then_branch)
                    + self.convert_in_block(else_branch)
            }
            Stmt::While { cond, body } => {
                self.convert_in_expression(cond) + self.convert_in_block(body)
            }
            Stmt::Block(stmts) => self.convert_in_block(stmts),
        }
    }

    fn convert_in_expression(&self, expr: &mut Expr) -> usize {
        let mut converted = match expr {
            Expr::Literal | Expr::Null | Expr::Local(_) | Expr::This => 0,
            Expr::New { args, .. } => self.convert_in_args(args),
            Expr::Assign { target, value } => {
                let in_target = match target {
                    Place::Local(_) => 0,
                    Place::Field { object, .. } => self.convert_in_expression(object),
                };
                in_target + self.convert_in_expression(value)
            }
            Expr::Field { object, .. } => self.convert_in_expression(object),
            Expr::Call { receiver, args, .. } => {
                receiver
                    .as_mut()
                    .map_or(0, |r| self.convert_in_expression(r))
                    + self.convert_in_args(args)
            }
            Expr::VirtualCall { receiver, args, .. } => {
                self.convert_in_expression(receiver) + self.convert_in_args(args)
            }
            Expr::Conditional {
                cond,
                then_value,
                else_value,
            } => {
                self.convert_in_expression(cond)
                    + self.convert_in_expression(then_value)
                    + self.convert_in_expression(else_value)
            }
            Expr::Convert { value } | Expr::Cast { value, .. } => {
                self.convert_in_expression(value)
            }
            Expr::Binary { lhs, rhs } => {
                self.convert_in_expression(lhs) + self.convert_in_expression(rhs)
            }
        };

        let target = match expr {
            Expr::VirtualCall { site, .. } => self.targets.get(site).copied(),
            _ => None,
        };
        if let Some(target) = target {
            if let Expr::VirtualCall { receiver, args, .. } = std::mem::replace(expr, Expr::Null) {
                *expr = Expr::Call {
                    target,
                    receiver: Some(receiver),
                    args,
                };
                converted += 1;
            }
        }
        converted
    }

    fn convert_in_args(&self, args: &mut [Expr]) -> usize {
        args.iter_mut().map(|a| self.convert_in_expression(a)).sum()
    }
}
