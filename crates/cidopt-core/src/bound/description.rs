//! Name-based description of a bound program
//!
//! This is the on-disk form the `cidopt` binary reads (YAML or JSON). Every
//! reference is by fully-qualified name; [`ProgramDescription::bind`] turns
//! them into lattice and function ids and assigns call-site ids in order of
//! appearance.

use super::{
    BoundFunction, CallSiteId, CompilationUnit, Expr, FunctionId, FunctionTable, LocalId,
    MethodGroup, Place, Program, Stmt,
};
use crate::errors::BindError;
use crate::lattice::{ClassId, ClassKind, ClassLattice, FieldId, MethodDecl};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramDescription {
    #[serde(default)]
    pub classes: Vec<ClassDescription>,
    #[serde(default)]
    pub functions: Vec<FunctionDescription>,
    #[serde(default)]
    pub units: Vec<UnitDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDescription {
    pub name: String,
    #[serde(default)]
    pub kind: ClassKind,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    /// Declared virtual even without listing methods here
    #[serde(default)]
    pub polymorphic: bool,
    /// Virtual methods declared (or overridden) by this class
    #[serde(default)]
    pub methods: Vec<MethodDescription>,
    #[serde(default)]
    pub fields: Vec<FieldDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescription {
    pub name: String,
    /// Implementing function; omitted for abstract methods
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default, rename = "final")]
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescription {
    pub name: String,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescription {
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default, rename = "static")]
    pub is_static: bool,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub body: Vec<StmtDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitDescription {
    pub name: String,
    #[serde(default)]
    pub functions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StmtDescription {
    Let {
        name: String,
        #[serde(default)]
        init: Option<ExprDescription>,
    },
    Expr {
        value: ExprDescription,
    },
    Return {
        #[serde(default)]
        value: Option<ExprDescription>,
    },
    If {
        cond: ExprDescription,
        #[serde(default)]
        then: Vec<StmtDescription>,
        #[serde(default, rename = "else")]
        otherwise: Vec<StmtDescription>,
    },
    While {
        cond: ExprDescription,
        #[serde(default)]
        body: Vec<StmtDescription>,
    },
    Block {
        #[serde(default)]
        body: Vec<StmtDescription>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprDescription {
    Literal,
    Null,
    Local {
        name: String,
    },
    This,
    New {
        class: String,
        #[serde(default)]
        ctor: Option<String>,
        #[serde(default)]
        args: Vec<ExprDescription>,
    },
    Assign {
        name: String,
        value: Box<ExprDescription>,
    },
    Store {
        object: Box<ExprDescription>,
        owner: String,
        field: String,
        value: Box<ExprDescription>,
    },
    Field {
        object: Box<ExprDescription>,
        owner: String,
        field: String,
    },
    Call {
        function: String,
        #[serde(default)]
        receiver: Option<Box<ExprDescription>>,
        #[serde(default)]
        args: Vec<ExprDescription>,
    },
    VirtualCall {
        receiver: Box<ExprDescription>,
        method: String,
        declaring: String,
        #[serde(default)]
        args: Vec<ExprDescription>,
    },
    Conditional {
        cond: Box<ExprDescription>,
        then: Box<ExprDescription>,
        #[serde(rename = "else")]
        otherwise: Box<ExprDescription>,
    },
    Convert {
        value: Box<ExprDescription>,
    },
    Cast {
        value: Box<ExprDescription>,
        to: String,
    },
    Binary {
        lhs: Box<ExprDescription>,
        rhs: Box<ExprDescription>,
    },
}

impl ProgramDescription {
    pub fn from_yaml(source: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    /// Resolve every name and produce the bound program
    pub fn bind(&self) -> Result<Program, BindError> {
        let mut lattice = ClassLattice::new();
        for class in &self.classes {
            let id = lattice.add_class(class.name.clone(), class.kind)?;
            if class.polymorphic || !class.methods.is_empty() {
                lattice.set_polymorphic(id, true);
            }
        }

        for class in &self.classes {
            let id = class_id(&lattice, &class.name, "class list")?;
            if let Some(base) = &class.base {
                let base = class_id(&lattice, base, &class.name)?;
                lattice.set_base(id, base)?;
            }
            for iface in &class.implements {
                let iface = class_id(&lattice, iface, &class.name)?;
                lattice.add_interface(id, iface)?;
            }
            for field in &class.fields {
                lattice.add_field(id, field.name.clone(), field.private);
            }
        }

        let mut functions = FunctionTable::new();
        for function in &self.functions {
            let owner = function
                .owner
                .as_deref()
                .map(|owner| class_id(&lattice, owner, &function.name))
                .transpose()?;
            functions
                .declare(function.name.clone(), owner)
                .ok_or_else(|| BindError::DuplicateFunction(function.name.clone()))?;
        }

        for class in &self.classes {
            let id = class_id(&lattice, &class.name, "class list")?;
            for method in &class.methods {
                let function = method
                    .function
                    .as_deref()
                    .map(|name| function_id(&functions, name, &class.name))
                    .transpose()?;
                lattice.add_method(
                    id,
                    method.name.clone(),
                    MethodDecl {
                        function,
                        is_final: method.is_final,
                    },
                );
            }
        }

        let bodies: FxHashMap<&str, &FunctionDescription> = self
            .functions
            .iter()
            .map(|f| (f.name.as_str(), f))
            .collect();
        let mut owning_unit: FxHashMap<&str, &str> = FxHashMap::default();
        let mut unit_of: FxHashMap<FunctionId, usize> = FxHashMap::default();
        let mut direct_calls: Vec<(usize, FunctionId)> = Vec::new();
        let mut next_site = 0u32;
        let mut units = Vec::with_capacity(self.units.len());

        for (index, unit) in self.units.iter().enumerate() {
            let mut bound = CompilationUnit::new(unit.name.clone());
            for name in &unit.functions {
                if let Some(owner) = owning_unit.insert(name.as_str(), unit.name.as_str()) {
                    return Err(BindError::FunctionInTwoUnits {
                        unit: unit.name.clone(),
                        function: name.clone(),
                        owner: owner.to_string(),
                    });
                }
                let description = bodies.get(name.as_str()).ok_or_else(|| {
                    BindError::UnknownFunction {
                        name: name.clone(),
                        context: format!("unit '{}'", unit.name),
                    }
                })?;
                let binder = BodyBinder::new(&lattice, &functions, description, &mut next_site);
                let (function, callees) = binder.bind()?;
                unit_of.insert(function.id, index);
                direct_calls.extend(callees.into_iter().map(|callee| (index, callee)));
                bound.functions.push(function);
            }
            units.push(bound);
        }

        for (caller_unit, callee) in direct_calls {
            if unit_of.get(&callee).is_some_and(|&unit| unit != caller_unit) {
                functions.mark_called_across_units(callee);
            }
        }

        Ok(Program {
            lattice,
            functions,
            units,
        })
    }
}

fn class_id(lattice: &ClassLattice, name: &str, context: &str) -> Result<ClassId, BindError> {
    lattice.lookup(name).ok_or_else(|| BindError::UnknownClass {
        name: name.to_string(),
        context: context.to_string(),
    })
}

fn function_id(
    functions: &FunctionTable,
    name: &str,
    context: &str,
) -> Result<FunctionId, BindError> {
    functions.lookup(name).ok_or_else(|| BindError::UnknownFunction {
        name: name.to_string(),
        context: context.to_string(),
    })
}

struct BodyBinder<'a> {
    lattice: &'a ClassLattice,
    functions: &'a FunctionTable,
    function: &'a FunctionDescription,
    locals: FxHashMap<String, LocalId>,
    local_count: u32,
    next_site: &'a mut u32,
    /// Targets of statically bound calls and constructors
    callees: Vec<FunctionId>,
}

impl<'a> BodyBinder<'a> {
    fn new(
        lattice: &'a ClassLattice,
        functions: &'a FunctionTable,
        function: &'a FunctionDescription,
        next_site: &'a mut u32,
    ) -> Self {
        Self {
            lattice,
            functions,
            function,
            locals: FxHashMap::default(),
            local_count: 0,
            next_site,
            callees: Vec::new(),
        }
    }

    fn bind(mut self) -> Result<(BoundFunction, Vec<FunctionId>), BindError> {
        let function = self.function;
        let id = function_id(self.functions, &function.name, "unit")?;
        let owner = self.functions.get(id).owner;
        let params: Vec<LocalId> = function
            .params
            .iter()
            .map(|name| self.declare_local(name))
            .collect();
        let body = self.bind_block(&function.body)?;

        let bound = BoundFunction {
            id,
            owner,
            has_this: owner.is_some() && !function.is_static,
            exported: function.exported,
            params,
            local_count: self.local_count,
            body,
        };
        Ok((bound, self.callees))
    }

    fn declare_local(&mut self, name: &str) -> LocalId {
        let id = LocalId(self.local_count);
        self.local_count += 1;
        self.locals.insert(name.to_string(), id);
        id
    }

    fn local(&self, name: &str) -> Result<LocalId, BindError> {
        self.locals
            .get(name)
            .copied()
            .ok_or_else(|| BindError::UnknownLocal {
                name: name.to_string(),
                function: self.function.name.clone(),
            })
    }

    fn class(&self, name: &str) -> Result<ClassId, BindError> {
        class_id(self.lattice, name, &self.function.name)
    }

    fn field(&self, owner: &str, field: &str) -> Result<FieldId, BindError> {
        let class = self.class(owner)?;
        self.lattice
            .lookup_field(class, field)
            .ok_or_else(|| BindError::UnknownField {
                class: owner.to_string(),
                field: field.to_string(),
            })
    }

    fn bind_block(&mut self, stmts: &[StmtDescription]) -> Result<Vec<Stmt>, BindError> {
        stmts.iter().map(|s| self.bind_stmt(s)).collect()
    }

    fn bind_stmt(&mut self, stmt: &StmtDescription) -> Result<Stmt, BindError> {
        Ok(match stmt {
            StmtDescription::Let { name, init } => {
                // The initializer cannot see the local it initializes
                let init = init.as_ref().map(|e| self.bind_expr(e)).transpose()?;
                let local = self.declare_local(name);
                Stmt::Let { local, init }
            }
            StmtDescription::Expr { value } => Stmt::Expr(self.bind_expr(value)?),
            StmtDescription::Return { value } => {
                Stmt::Return(value.as_ref().map(|e| self.bind_expr(e)).transpose()?)
            }
            StmtDescription::If {
                cond,
                then,
                otherwise,
            } => Stmt::If {
                cond: self.bind_expr(cond)?,
                then_branch: self.bind_block(then)?,
                else_branch: self.bind_block(otherwise)?,
            },
            StmtDescription::While { cond, body } => Stmt::While {
                cond: self.bind_expr(cond)?,
                body: self.bind_block(body)?,
            },
            StmtDescription::Block { body } => Stmt::Block(self.bind_block(body)?),
        })
    }

    fn bind_boxed(&mut self, expr: &ExprDescription) -> Result<Box<Expr>, BindError> {
        self.bind_expr(expr).map(Box::new)
    }

    fn bind_args(&mut self, args: &[ExprDescription]) -> Result<Vec<Expr>, BindError> {
        args.iter().map(|a| self.bind_expr(a)).collect()
    }

    fn bind_expr(&mut self, expr: &ExprDescription) -> Result<Expr, BindError> {
        Ok(match expr {
            ExprDescription::Literal => Expr::Literal,
            ExprDescription::Null => Expr::Null,
            ExprDescription::Local { name } => Expr::Local(self.local(name)?),
            ExprDescription::This => {
                let has_this = self.function.owner.is_some() && !self.function.is_static;
                if !has_this {
                    return Err(BindError::ThisOutsideMethod(self.function.name.clone()));
                }
                Expr::This
            }
            ExprDescription::New { class, ctor, args } => {
                let ctor = ctor
                    .as_deref()
                    .map(|name| function_id(self.functions, name, &self.function.name))
                    .transpose()?;
                self.callees.extend(ctor);
                Expr::New {
                    class: self.class(class)?,
                    ctor,
                    args: self.bind_args(args)?,
                }
            }
            ExprDescription::Assign { name, value } => {
                let value = self.bind_boxed(value)?;
                Expr::Assign {
                    target: Place::Local(self.local(name)?),
                    value,
                }
            }
            ExprDescription::Store {
                object,
                owner,
                field,
                value,
            } => Expr::Assign {
                target: Place::Field {
                    object: self.bind_boxed(object)?,
                    field: self.field(owner, field)?,
                },
                value: self.bind_boxed(value)?,
            },
            ExprDescription::Field {
                object,
                owner,
                field,
            } => Expr::Field {
                object: self.bind_boxed(object)?,
                field: self.field(owner, field)?,
            },
            ExprDescription::Call {
                function,
                receiver,
                args,
            } => {
                let target = function_id(self.functions, function, &self.function.name)?;
                self.callees.push(target);
                Expr::Call {
                    target,
                    receiver: receiver.as_deref().map(|r| self.bind_boxed(r)).transpose()?,
                    args: self.bind_args(args)?,
                }
            }
            ExprDescription::VirtualCall {
                receiver,
                method,
                declaring,
                args,
            } => {
                let receiver = self.bind_boxed(receiver)?;
                let args = self.bind_args(args)?;
                let site = CallSiteId(*self.next_site);
                *self.next_site += 1;
                Expr::VirtualCall {
                    site,
                    receiver,
                    method: MethodGroup {
                        name: method.clone(),
                        declaring: self.class(declaring)?,
                    },
                    args,
                }
            }
            ExprDescription::Conditional {
                cond,
                then,
                otherwise,
            } => Expr::Conditional {
                cond: self.bind_boxed(cond)?,
                then_value: self.bind_boxed(then)?,
                else_value: self.bind_boxed(otherwise)?,
            },
            ExprDescription::Convert { value } => Expr::Convert {
                value: self.bind_boxed(value)?,
            },
            ExprDescription::Cast { value, to } => Expr::Cast {
                value: self.bind_boxed(value)?,
                to: self.class(to)?,
            },
            ExprDescription::Binary { lhs, rhs } => Expr::Binary {
                lhs: self.bind_boxed(lhs)?,
                rhs: self.bind_boxed(rhs)?,
            },
        })
    }
}
