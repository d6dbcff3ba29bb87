//! Tree-walking evaluator
//!
//! Evaluates parsed expressions and statement lists against a [`Scope`].
//! Reads resolve through the scoped context; every write lands in the
//! [`Store`] (or in a local) so dirty-path tracking stays intact.

use std::rc::Rc;

use super::ast::{AssignOp, AstId, AstKind, BinaryOp, Literal, LogicalOp, Pattern, UnaryOp, UpdateOp};
use super::intrinsics;
use super::{Closure, Expression, Program};
use crate::scope::{Local, Resolved, Scope};
use crate::value::{Object, format_number};
use crate::{ArrayOp, Environment, EvalError, Function, Path, ReactiveError, Store, Value};

/// Name of the server-callback entry point produced by handler rewriting
pub const CALLBACK_FN: &str = "__callback";

/// Nested call limit
pub const MAX_CALL_DEPTH: usize = 64;

/// Call that could not be resolved locally
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub name: String,
    pub args: Vec<Value>,
}

enum Flow {
    Normal(Value),
    Return(Value),
}

impl Flow {
    fn into_value(self) -> Value {
        match self {
            Flow::Normal(v) | Flow::Return(v) => v,
        }
    }
}

/// Writable location
#[derive(Debug, Clone)]
enum Place {
    Store(Path),
    Local(String, Vec<String>),
}

/// Result of reading a member chain
enum Ref {
    Value(Value),
    Path(Path),
}

fn store_error(err: ReactiveError) -> EvalError {
    match err {
        ReactiveError::Eval(e) => e,
        other => EvalError::Type(other.to_string()),
    }
}

/// Property key of a computed member access
fn property_key(v: &Value) -> String {
    match v {
        Value::Number(n) => format_number(*n),
        Value::String(s) => s.clone(),
        other => other.to_display(),
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        _ => a == b,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (x, y) if x.is_nullish() || y.is_nullish() => x.is_nullish() && y.is_nullish(),
        (Value::Number(_) | Value::Bool(_), Value::String(_) | Value::Bool(_))
        | (Value::String(_) | Value::Bool(_), Value::Number(_) | Value::Bool(_)) => {
            a.to_number() == b.to_number()
        }
        _ => strict_eq(a, b),
    }
}

fn add(a: Value, b: Value) -> Value {
    let numeric = |v: &Value| matches!(v, Value::Number(_) | Value::Bool(_) | Value::Null | Value::Undefined);
    if numeric(&a) && numeric(&b) {
        Value::Number(a.to_number() + b.to_number())
    } else {
        Value::String(a.to_display() + &b.to_display())
    }
}

fn compare(op: BinaryOp, a: &Value, b: &Value) -> bool {
    let ordering = match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => a.to_number().partial_cmp(&b.to_number()),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::LtEq => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    }
}

/// Expression evaluator bound to a store, an environment and a scope
pub struct Interpreter<'a> {
    store: &'a mut Store,
    env: &'a Environment,
    scope: Scope,
    remote: Option<Vec<RemoteCall>>,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(store: &'a mut Store, env: &'a Environment, scope: Scope) -> Self {
        Self {
            store,
            env,
            scope,
            remote: None,
            depth: 0,
        }
    }

    /// Collect unresolved calls instead of failing on them
    pub fn with_remote_calls(mut self) -> Self {
        self.remote = Some(Vec::new());
        self
    }

    pub fn take_remote_calls(&mut self) -> Vec<RemoteCall> {
        self.remote.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Evaluate a single expression
    pub fn eval(&mut self, expr: &Expression) -> Result<Value, EvalError> {
        let program = Rc::clone(expr.program());
        self.eval_node(&program, expr.root())
    }

    /// Store path a member chain denotes, `None` when it reads a plain value
    pub fn eval_path(&mut self, expr: &Expression) -> Result<Option<Path>, EvalError> {
        let program = Rc::clone(expr.program());
        Ok(match self.read_ref(&program, expr.root())? {
            Ref::Path(path) => Some(path),
            Ref::Value(_) => None,
        })
    }

    /// Run a statement list; yields the `return` value or the value of the
    /// last expression statement
    pub fn run(&mut self, program: &Rc<Program>) -> Result<Value, EvalError> {
        Ok(self.exec(program, program.root())?.into_value())
    }

    /// Run one top-level statement, keeping its declarations in scope
    pub fn exec_statement(&mut self, program: &Rc<Program>, id: AstId) -> Result<Value, EvalError> {
        if let AstKind::FunctionDecl { name, .. } = program.ast().kind(id) {
            if let Some(f) = self.closure(program, id) {
                self.scope.bind(name.to_string(), Local::Value(Value::Function(f)));
            }
            return Ok(Value::Undefined);
        }
        Ok(self.exec(program, id)?.into_value())
    }

    /// Function value for a function declaration or arrow node, capturing
    /// the current scope
    pub fn closure(&self, program: &Rc<Program>, id: AstId) -> Option<Function> {
        let (name, params, body, expression_body) = match program.ast().kind(id) {
            AstKind::FunctionDecl { name, params, body } => {
                (Some(name.to_string()), params, *body, false)
            }
            AstKind::Arrow {
                params,
                body,
                expression,
            } => (None, params, *body, *expression),
            _ => return None,
        };
        Some(Function::Closure(Rc::new(Closure {
            name,
            program: Rc::clone(program),
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
            expression_body,
            scope: self.scope.clone(),
        })))
    }

    /// Invoke a function value
    pub fn call(&mut self, func: &Function, args: Vec<Value>) -> Result<Value, EvalError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::StackOverflow);
        }
        match func {
            Function::Closure(closure) => {
                let mut scope = closure.scope.clone();
                if let Some(name) = &closure.name {
                    scope.bind(name.clone(), Local::Value(Value::Function(func.clone())));
                }
                let mut args = args.into_iter();
                for param in &closure.params {
                    scope.bind(param.clone(), Local::Value(args.next().unwrap_or_default()));
                }

                let saved = std::mem::replace(&mut self.scope, scope);
                self.depth += 1;
                let result = if closure.expression_body {
                    self.eval_node(&closure.program, closure.body)
                } else {
                    self.exec(&closure.program, closure.body).map(|flow| match flow {
                        Flow::Return(v) => v,
                        Flow::Normal(_) => Value::Undefined,
                    })
                };
                self.depth -= 1;
                self.scope = saved;
                result
            }
            Function::Native { func, .. } => {
                let func = Rc::clone(func);
                self.depth += 1;
                let result = (*func)(self, args);
                self.depth -= 1;
                result
            }
            Function::Setter(path) => {
                let next = match args.into_iter().next() {
                    Some(Value::Function(f)) => {
                        let previous = self.store.get(path);
                        self.call(&f, vec![previous])?
                    }
                    Some(v) => v,
                    None => Value::Undefined,
                };
                self.store.write(path, next).map_err(store_error)?;
                Ok(Value::Undefined)
            }
        }
    }

    // === Statements ===

    fn hoist(&mut self, program: &Rc<Program>, body: &[AstId]) {
        for &stmt in body {
            if let AstKind::FunctionDecl { name, .. } = program.ast().kind(stmt) {
                if let Some(f) = self.closure(program, stmt) {
                    self.scope.bind(name.to_string(), Local::Value(Value::Function(f)));
                }
            }
        }
    }

    fn exec(&mut self, program: &Rc<Program>, id: AstId) -> Result<Flow, EvalError> {
        match program.ast().kind(id) {
            AstKind::Program { body } | AstKind::Block { body } => {
                let mark = self.scope.depth();
                self.hoist(program, body);
                let mut last = Value::Undefined;
                for &stmt in body {
                    match self.exec(program, stmt) {
                        Ok(Flow::Normal(v)) => last = v,
                        other => {
                            self.scope.truncate(mark);
                            return other;
                        }
                    }
                }
                self.scope.truncate(mark);
                Ok(Flow::Normal(last))
            }
            AstKind::ExprStmt { expr } => Ok(Flow::Normal(self.eval_node(program, *expr)?)),
            AstKind::Return { argument } => {
                let value = match argument {
                    Some(arg) => self.eval_node(program, *arg)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            AstKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_node(program, *test)?.is_truthy() {
                    self.exec(program, *consequent)
                } else if let Some(alt) = alternate {
                    self.exec(program, *alt)
                } else {
                    Ok(Flow::Normal(Value::Undefined))
                }
            }
            AstKind::VarDecl { target, init, .. } => {
                let value = match init {
                    Some(init) => self.eval_node(program, *init)?,
                    None => Value::Undefined,
                };
                match target {
                    Pattern::Ident(name) => {
                        self.scope.bind(name.to_string(), Local::Value(value));
                    }
                    Pattern::Array(items) => {
                        for (i, name) in items.iter().enumerate() {
                            if let Some(name) = name {
                                let item = value.get(&i.to_string());
                                self.scope.bind(name.to_string(), Local::Value(item));
                            }
                        }
                    }
                }
                Ok(Flow::Normal(Value::Undefined))
            }
            // bound by hoisting
            AstKind::FunctionDecl { .. } | AstKind::Empty => Ok(Flow::Normal(Value::Undefined)),
            _ => Ok(Flow::Normal(self.eval_node(program, id)?)),
        }
    }

    // === Expressions ===

    fn eval_node(&mut self, program: &Rc<Program>, id: AstId) -> Result<Value, EvalError> {
        match program.ast().kind(id) {
            AstKind::Literal { value } => Ok(match value {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.to_string()),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
                Literal::Undefined => Value::Undefined,
            }),
            AstKind::Ident { .. } | AstKind::Member { .. } | AstKind::Index { .. } => {
                let r = self.read_ref(program, id)?;
                Ok(self.load(r))
            }
            AstKind::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(&expr) = exprs.get(i) {
                        out.push_str(&self.eval_node(program, expr)?.to_display());
                    }
                }
                Ok(Value::String(out))
            }
            AstKind::Array { elements } => Ok(Value::Array(self.eval_list(program, elements)?)),
            AstKind::Object { props } => {
                let mut map = Object::new();
                for (key, value) in props {
                    if let AstKind::Spread { argument } = program.ast().kind(*value) {
                        match self.eval_node(program, *argument)? {
                            Value::Object(extra) => map.extend(extra),
                            Value::Array(items) => map.extend(
                                items.into_iter().enumerate().map(|(i, v)| (i.to_string(), v)),
                            ),
                            _ => {}
                        }
                        continue;
                    }
                    let v = self.eval_node(program, *value)?;
                    map.insert(key.to_string(), v);
                }
                Ok(Value::Object(map))
            }
            AstKind::Call {
                callee,
                args,
                optional,
            } => self.eval_call(program, *callee, args, *optional),
            AstKind::Unary { op, argument } => {
                let v = self.eval_node(program, *argument)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!v.is_truthy()),
                    UnaryOp::Minus => Value::Number(-v.to_number()),
                    UnaryOp::Plus => Value::Number(v.to_number()),
                    UnaryOp::Typeof => Value::string(v.type_of()),
                })
            }
            AstKind::Update {
                op,
                prefix,
                argument,
            } => {
                let place = self.place(program, *argument)?;
                let old = self.read_place(&place).to_number();
                let new = match op {
                    UpdateOp::Increment => old + 1.0,
                    UpdateOp::Decrement => old - 1.0,
                };
                self.write_place(place, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            AstKind::Binary { op, left, right } => {
                let l = self.eval_node(program, *left)?;
                let r = self.eval_node(program, *right)?;
                Ok(match op {
                    BinaryOp::Add => add(l, r),
                    BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
                    BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
                    BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
                    BinaryOp::Mod => Value::Number(l.to_number() % r.to_number()),
                    BinaryOp::Eq => Value::Bool(loose_eq(&l, &r)),
                    BinaryOp::NotEq => Value::Bool(!loose_eq(&l, &r)),
                    BinaryOp::StrictEq => Value::Bool(strict_eq(&l, &r)),
                    BinaryOp::StrictNotEq => Value::Bool(!strict_eq(&l, &r)),
                    cmp => Value::Bool(compare(*cmp, &l, &r)),
                })
            }
            AstKind::Logical { op, left, right } => {
                let l = self.eval_node(program, *left)?;
                let short = match op {
                    LogicalOp::And => !l.is_truthy(),
                    LogicalOp::Or => l.is_truthy(),
                    LogicalOp::Nullish => !l.is_nullish(),
                };
                if short {
                    Ok(l)
                } else {
                    self.eval_node(program, *right)
                }
            }
            AstKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_node(program, *test)?.is_truthy() {
                    self.eval_node(program, *consequent)
                } else {
                    self.eval_node(program, *alternate)
                }
            }
            AstKind::Assign { op, target, value } => {
                let place = self.place(program, *target)?;
                let rhs = self.eval_node(program, *value)?;
                let next = match op {
                    AssignOp::Assign => rhs,
                    AssignOp::AddAssign => add(self.read_place(&place), rhs),
                    AssignOp::SubAssign => {
                        Value::Number(self.read_place(&place).to_number() - rhs.to_number())
                    }
                };
                self.write_place(place, next.clone())?;
                Ok(next)
            }
            AstKind::Arrow { .. } => self
                .closure(program, id)
                .map(Value::Function)
                .ok_or_else(|| EvalError::Type("invalid function".into())),
            AstKind::Spread { .. } => Err(EvalError::Type("unexpected spread".into())),
            _ => Err(EvalError::Type(format!(
                "statement in expression position: {}",
                program.text(id)
            ))),
        }
    }

    fn eval_list(&mut self, program: &Rc<Program>, ids: &[AstId]) -> Result<Vec<Value>, EvalError> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if let AstKind::Spread { argument } = program.ast().kind(id) {
                match self.eval_node(program, *argument)? {
                    Value::Array(items) => out.extend(items),
                    Value::String(s) => out.extend(s.chars().map(|c| Value::String(c.to_string()))),
                    other => return Err(EvalError::Type(format!("{other:?} is not iterable"))),
                }
            } else {
                out.push(self.eval_node(program, id)?);
            }
        }
        Ok(out)
    }

    // === Reads ===

    /// An earlier link of this member chain is optional (`a?.b.c`)
    fn in_optional_chain(program: &Program, mut id: AstId) -> bool {
        loop {
            match program.ast().kind(id) {
                AstKind::Member {
                    object, optional, ..
                }
                | AstKind::Index {
                    object, optional, ..
                } => {
                    if *optional {
                        return true;
                    }
                    id = *object;
                }
                AstKind::Call {
                    callee, optional, ..
                } => {
                    if *optional {
                        return true;
                    }
                    id = *callee;
                }
                _ => return false,
            }
        }
    }

    fn read_ref(&mut self, program: &Rc<Program>, id: AstId) -> Result<Ref, EvalError> {
        match program.ast().kind(id) {
            AstKind::Ident { name } => Ok(match self.scope.resolve(name, self.store, self.env) {
                Resolved::Local(v) | Resolved::Global(v) => Ref::Value(v),
                Resolved::State(path) => Ref::Path(path),
                Resolved::Function(f) => Ref::Value(Value::Function(f)),
                Resolved::Missing => Ref::Value(Value::Undefined),
            }),
            AstKind::Member {
                object,
                property,
                optional,
            } => {
                let base = self.read_ref(program, *object)?;
                let soft = *optional || Self::in_optional_chain(program, *object);
                self.member(base, property, soft)
            }
            AstKind::Index {
                object,
                index,
                optional,
            } => {
                let base = self.read_ref(program, *object)?;
                let key = property_key(&self.eval_node(program, *index)?);
                let soft = *optional || Self::in_optional_chain(program, *object);
                self.member(base, &key, soft)
            }
            _ => Ok(Ref::Value(self.eval_node(program, id)?)),
        }
    }

    fn member(&self, base: Ref, key: &str, soft: bool) -> Result<Ref, EvalError> {
        let value = match base {
            Ref::Path(path) => {
                if let Some(len) = self.store.array_len(&path) {
                    if key == "length" {
                        return Ok(Ref::Value(Value::Number(len as f64)));
                    }
                }
                if self.store.handle(&path).is_some() {
                    return Ok(Ref::Path(path.child(key)));
                }
                self.store.get(&path)
            }
            Ref::Value(v) => v,
        };
        if value.is_nullish() {
            if soft {
                return Ok(Ref::Value(Value::Undefined));
            }
            return Err(EvalError::Type(format!(
                "cannot read properties of {} (reading '{key}')",
                value.type_of().replace("object", "null")
            )));
        }
        Ok(Ref::Value(value.get(key)))
    }

    fn load(&self, r: Ref) -> Value {
        match r {
            Ref::Value(v) => v,
            Ref::Path(path) => self.store.get(&path),
        }
    }

    // === Writes ===

    fn place(&mut self, program: &Rc<Program>, id: AstId) -> Result<Place, EvalError> {
        match program.ast().kind(id) {
            AstKind::Ident { name } => {
                match self.scope.local(name) {
                    Some(Local::Value(_)) => return Ok(Place::Local(name.to_string(), Vec::new())),
                    Some(Local::Alias(path)) => return Ok(Place::Store(path.clone())),
                    None => {}
                }
                match self.scope.resolve(name, self.store, self.env) {
                    Resolved::State(path) => Ok(Place::Store(path)),
                    // forward reference: lands in the current scope
                    Resolved::Missing => Ok(Place::Store(self.scope.hierarchy().key(name))),
                    _ => Err(EvalError::InvalidTarget),
                }
            }
            AstKind::Member {
                object, property, ..
            } => {
                let base = self.place(program, *object)?;
                Ok(Self::extend(base, property.to_string()))
            }
            AstKind::Index { object, index, .. } => {
                let base = self.place(program, *object)?;
                let key = property_key(&self.eval_node(program, *index)?);
                Ok(Self::extend(base, key))
            }
            _ => Err(EvalError::InvalidTarget),
        }
    }

    fn extend(place: Place, key: String) -> Place {
        match place {
            Place::Store(path) => Place::Store(path.child(key)),
            Place::Local(name, mut sub) => {
                sub.push(key);
                Place::Local(name, sub)
            }
        }
    }

    fn read_place(&self, place: &Place) -> Value {
        match place {
            Place::Store(path) => self.store.get(path),
            Place::Local(name, sub) => match self.scope.local(name) {
                Some(Local::Value(v)) => v.get_in(sub),
                Some(Local::Alias(path)) => self.store.get(&path.join(sub)),
                None => Value::Undefined,
            },
        }
    }

    fn write_place(&mut self, place: Place, value: Value) -> Result<(), EvalError> {
        match place {
            Place::Store(path) => self.store.write(&path, value).map_err(store_error),
            Place::Local(name, sub) => match self.scope.local_mut(&name) {
                Some(Local::Value(current)) => {
                    current.set_in(&sub, value);
                    Ok(())
                }
                Some(Local::Alias(path)) => {
                    let path = path.join(&sub);
                    self.store.write(&path, value).map_err(store_error)
                }
                None => Err(EvalError::InvalidTarget),
            },
        }
    }

    // === Calls ===

    fn eval_call(
        &mut self,
        program: &Rc<Program>,
        callee: AstId,
        args: &[AstId],
        optional: bool,
    ) -> Result<Value, EvalError> {
        match program.ast().kind(callee) {
            AstKind::Member {
                object, property, ..
            } => {
                let key = property.to_string();
                self.method_call(program, callee, *object, &key, args)
            }
            AstKind::Index { object, index, .. } => {
                let key = property_key(&self.eval_node(program, *index)?);
                self.method_call(program, callee, *object, &key, args)
            }
            AstKind::Ident { name } => {
                let name = name.to_string();
                let values = self.eval_list(program, args)?;
                self.call_named(&name, values, optional)
            }
            _ => {
                let target = self.eval_node(program, callee)?;
                match target {
                    Value::Function(f) => {
                        let values = self.eval_list(program, args)?;
                        self.call(&f, values)
                    }
                    v if v.is_nullish() && optional => Ok(Value::Undefined),
                    _ => Err(EvalError::NotCallable(program.text(callee).to_string())),
                }
            }
        }
    }

    fn call_named(&mut self, name: &str, args: Vec<Value>, optional: bool) -> Result<Value, EvalError> {
        if name == CALLBACK_FN {
            let mut args = args.into_iter();
            let target = args.next().map(|v| v.to_display()).unwrap_or_default();
            return self.remote_call(target, args.collect());
        }
        let target = match self.scope.resolve(name, self.store, self.env) {
            Resolved::Function(f) => Value::Function(f),
            Resolved::Local(v) | Resolved::Global(v) => v,
            Resolved::State(path) => self.store.get(&path),
            Resolved::Missing => {
                if optional {
                    return Ok(Value::Undefined);
                }
                return self.remote_call(name.to_string(), args);
            }
        };
        match target {
            Value::Function(f) => self.call(&f, args),
            v if v.is_nullish() && optional => Ok(Value::Undefined),
            _ => Err(EvalError::NotCallable(name.to_string())),
        }
    }

    fn remote_call(&mut self, name: String, args: Vec<Value>) -> Result<Value, EvalError> {
        match self.remote.as_mut() {
            Some(calls) => {
                tracing::debug!("deferring unresolved call {} to server", name);
                calls.push(RemoteCall { name, args });
                Ok(Value::Undefined)
            }
            None => Err(EvalError::NotDefined(name)),
        }
    }

    fn method_call(
        &mut self,
        program: &Rc<Program>,
        callee: AstId,
        object: AstId,
        key: &str,
        args: &[AstId],
    ) -> Result<Value, EvalError> {
        if ArrayOp::is_mutator(key) {
            if let Ok(place) = self.place(program, object) {
                if let Value::Array(_) = self.read_place(&place) {
                    let values = self.eval_list(program, args)?;
                    return self.mutate(place, key, values);
                }
            }
        }

        let base = self.read_ref(program, object)?;
        let soft = Self::in_optional_chain(program, callee);
        let receiver = self.load(base);
        if receiver.is_nullish() {
            if soft {
                return Ok(Value::Undefined);
            }
            return Err(EvalError::Type(format!(
                "cannot read properties of {} (reading '{key}')",
                receiver.type_of().replace("object", "null")
            )));
        }
        let values = self.eval_list(program, args)?;

        if let Value::Function(f) = receiver.get(key) {
            return self.call(&f, values);
        }
        let result = match &receiver {
            Value::Array(items) => {
                if ArrayOp::is_mutator(key) {
                    // temporary array, not stored anywhere
                    let mut items = items.clone();
                    let op = intrinsics::array_op(key, values)?;
                    Some(intrinsics::mutate_owned(&mut items, op))
                } else {
                    intrinsics::call_array(self, items, key, values)?
                }
            }
            Value::String(s) => intrinsics::call_string(s, key, &values),
            Value::Number(n) => intrinsics::call_number(*n, key, &values),
            _ => None,
        };
        result.ok_or_else(|| EvalError::NotCallable(program.text(callee).to_string()))
    }

    fn mutate(&mut self, place: Place, method: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let comparator = match (method, args.first()) {
            ("sort", Some(Value::Function(f))) => Some(f.clone()),
            _ => None,
        };
        match place {
            Place::Store(path) => match comparator {
                Some(compare) => {
                    let mut items = match self.store.get(&path) {
                        Value::Array(items) => items,
                        _ => return Err(EvalError::Type(format!("{path} is not an array"))),
                    };
                    intrinsics::sort_with(self, &mut items, &compare)?;
                    let sorted = Value::Array(items.clone());
                    self.store
                        .mutate_array(
                            &path,
                            ArrayOp::Splice {
                                start: 0,
                                delete: None,
                                items,
                            },
                        )
                        .map_err(store_error)?;
                    Ok(sorted)
                }
                None => {
                    let op = intrinsics::array_op(method, args)?;
                    self.store.mutate_array(&path, op).map_err(store_error)
                }
            },
            Place::Local(..) => {
                let mut items = match self.read_place(&place) {
                    Value::Array(items) => items,
                    _ => return Err(EvalError::Type("not an array".into())),
                };
                let result = match comparator {
                    Some(compare) => {
                        intrinsics::sort_with(self, &mut items, &compare)?;
                        Value::Array(items.clone())
                    }
                    None => intrinsics::mutate_owned(&mut items, intrinsics::array_op(method, args)?),
                };
                self.write_place(place, Value::Array(items))?;
                Ok(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_expression, parse_program};
    use crate::Hierarchy;

    fn eval_in(store: &mut Store, env: &Environment, src: &str) -> Result<Value, EvalError> {
        let expr = parse_expression(src)?;
        Interpreter::new(store, env, Scope::default()).eval(&expr)
    }

    fn eval(src: &str) -> Value {
        let mut store = Store::new();
        let env = Environment::default();
        eval_in(&mut store, &env, src).unwrap()
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(eval("1 + 2 * 3"), Value::from(7.0));
        assert_eq!(eval("'a' + 1"), Value::from("a1"));
        assert_eq!(eval("`n=${2 + 2}`"), Value::from("n=4"));
        assert_eq!(eval("7 % 4"), Value::from(3.0));
    }

    #[test]
    fn test_equality() {
        assert_eq!(eval("1 == '1'"), Value::Bool(true));
        assert_eq!(eval("1 === '1'"), Value::Bool(false));
        assert_eq!(eval("null == undefined"), Value::Bool(true));
        assert_eq!(eval("[1, 2] === [1, 2]"), Value::Bool(true));
        assert_eq!(eval("NaN === NaN"), Value::Bool(false));
    }

    #[test]
    fn test_logical_and_ternary() {
        assert_eq!(eval("0 || 'x'"), Value::from("x"));
        assert_eq!(eval("0 ?? 'x'"), Value::from(0.0));
        assert_eq!(eval("null ?? 'x'"), Value::from("x"));
        assert_eq!(eval("1 > 2 ? 'a' : 'b'"), Value::from("b"));
    }

    #[test]
    fn test_state_reads_and_writes() {
        let mut store = Store::new();
        let env = Environment::default();
        store
            .write(&Path::parse("app.user"), Value::object([("name", Value::from("Ann"))]))
            .unwrap();
        store.take_dirty();
        assert_eq!(
            eval_in(&mut store, &env, "user.name.toUpperCase()").unwrap(),
            Value::from("ANN")
        );
        eval_in(&mut store, &env, "user.name = 'Bo'").unwrap();
        assert_eq!(store.get(&Path::parse("app.user.name")), Value::from("Bo"));
        assert!(store.dirty().contains(&Path::parse("app.user.name")));
    }

    #[test]
    fn test_optional_chaining() {
        assert_eq!(eval("missing?.a.b"), Value::Undefined);
        let mut store = Store::new();
        let env = Environment::default();
        assert!(matches!(
            eval_in(&mut store, &env, "missing.a"),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn test_array_intrinsics() {
        assert_eq!(eval("[1, 2, 3].map(x => x * 2).join('-')"), Value::from("2-4-6"));
        assert_eq!(eval("[1, 2, 3].filter(x => x > 1).length"), Value::from(2.0));
        assert_eq!(eval("[{id: 1}, {id: 2}].find(t => t.id === 2).id"), Value::from(2.0));
        assert_eq!(eval("[1, 2, 3].reduce((a, b) => a + b, 0)"), Value::from(6.0));
        assert_eq!(eval("[1, 2].includes(2)"), Value::Bool(true));
    }

    #[test]
    fn test_store_array_mutators() {
        let mut store = Store::new();
        let env = Environment::default();
        store
            .write(&Path::parse("app.items"), Value::Array(vec![Value::from(3.0), Value::from(1.0)]))
            .unwrap();
        store.take_dirty();
        eval_in(&mut store, &env, "items.push(2)").unwrap();
        let dirty: Vec<String> = store.take_dirty().iter().map(ToString::to_string).collect();
        assert_eq!(dirty, vec!["app.items", "app.items.*"]);

        eval_in(&mut store, &env, "items.sort((a, b) => a - b)").unwrap();
        assert_eq!(
            store.get(&Path::parse("app.items")),
            Value::Array(vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)])
        );
    }

    #[test]
    fn test_program_with_functions_and_locals() {
        let mut store = Store::new();
        let env = Environment::default();
        let program = parse_program(
            "function double(n) { return n * 2 }\nlet list = [];\nlist.push(double(4));\nif (list.length === 1) { return list[0] } else { return -1 }",
        )
        .unwrap();
        let value = Interpreter::new(&mut store, &env, Scope::default())
            .run(&program)
            .unwrap();
        assert_eq!(value, Value::from(8.0));
        assert!(store.dirty().is_empty());
    }

    #[test]
    fn test_recursion_and_depth_limit() {
        let mut store = Store::new();
        let env = Environment::default();
        let program =
            parse_program("function fact(n) { return n <= 1 ? 1 : n * fact(n - 1) } fact(5)").unwrap();
        let value = Interpreter::new(&mut store, &env, Scope::default())
            .run(&program)
            .unwrap();
        assert_eq!(value, Value::from(120.0));

        let program = parse_program("function f() { return f() } f()").unwrap();
        let err = Interpreter::new(&mut store, &env, Scope::default())
            .run(&program)
            .unwrap_err();
        assert_eq!(err, EvalError::StackOverflow);
    }

    #[test]
    fn test_setter_with_updater_function() {
        let mut store = Store::new();
        let mut env = Environment::default();
        let h = Hierarchy::root();
        env.states.declare(&h, "count");
        store.write(&h.key("count"), Value::from(1.0)).unwrap();
        eval_in(&mut store, &env, "setCount(c => c + 10)").unwrap();
        assert_eq!(store.get(&h.key("count")), Value::from(11.0));
    }

    #[test]
    fn test_unresolved_calls() {
        let mut store = Store::new();
        let env = Environment::default();
        let expr = parse_expression("save(1, 'a')").unwrap();
        assert_eq!(
            Interpreter::new(&mut store, &env, Scope::default()).eval(&expr),
            Err(EvalError::NotDefined("save".into()))
        );

        let mut interp = Interpreter::new(&mut store, &env, Scope::default()).with_remote_calls();
        interp.eval(&expr).unwrap();
        let program = parse_program("__callback('Cart->add', 3)").unwrap();
        interp.run(&program).unwrap();
        assert_eq!(
            interp.take_remote_calls(),
            vec![
                RemoteCall {
                    name: "save".into(),
                    args: vec![Value::from(1.0), Value::from("a")],
                },
                RemoteCall {
                    name: "Cart->add".into(),
                    args: vec![Value::from(3.0)],
                },
            ]
        );
    }

    #[test]
    fn test_alias_local_writes_through() {
        let mut store = Store::new();
        let env = Environment::default();
        let todos = Path::parse("app.todos");
        store
            .write(&todos, Value::from_json_str(r#"[{"done": false}]"#).unwrap())
            .unwrap();
        store.take_dirty();
        let scope = Scope::default().with_local("todo", Local::Alias(todos.child("0")));
        let expr = parse_expression("todo.done = !todo.done").unwrap();
        Interpreter::new(&mut store, &env, scope).eval(&expr).unwrap();
        assert_eq!(store.get(&Path::parse("app.todos.0.done")), Value::Bool(true));
        assert!(store.dirty().contains(&Path::parse("app.todos.*.done")));
    }

    #[test]
    fn test_eval_path_of_member_chain() {
        let mut store = Store::new();
        let env = Environment::default();
        store
            .write(&Path::parse("app.user"), Value::from_json_str(r#"{"tags": ["a"]}"#).unwrap())
            .unwrap();
        let mut interp = Interpreter::new(&mut store, &env, Scope::default());
        let chain = parse_expression("user.tags").unwrap();
        assert_eq!(interp.eval_path(&chain).unwrap(), Some(Path::parse("app.user.tags")));
        let computed = parse_expression("user.tags.concat([])").unwrap();
        assert_eq!(interp.eval_path(&computed).unwrap(), None);
    }
}
