//! Rowwise lowering: typed expressions to one `expression_table` call.
//!
//! Every input column an expression reads becomes a positional dependency of
//! the engine call (see [`RowwiseEvalState`]). Async applications cannot be
//! evaluated inline; they are materialized into temporary tables first and
//! zipped onto the input before the final call.

use std::sync::Arc;

use rivulet_engine::{Callable, CallableRef, EngineExpr, TableHandle, UnaryOperator};
use rivulet_expr::typing::{binary_operand_type, resolve_method};
use rivulet_expr::{ApplyExpr, Column, ColumnExpr, ColumnKind, ExprKind, TableRef, Universe};
use rivulet_plan::Storage;
use rivulet_result::{Error, Result};
use rivulet_types::{ColumnPath, DType, TableProperties, Value};
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::ctx::{LowerCtx, column_properties};
use crate::operator_mapping;
use crate::type_verifier;

/// Dependencies collected while lowering the expressions of one rowwise
/// pass.
#[derive(Debug)]
pub struct RowwiseEvalState {
    dependencies: Vec<Column>,
    index: FxHashMap<Column, usize>,
    pending: Vec<PendingMaterialization>,
    deterministic: bool,
    disable_typechecking: bool,
}

impl Default for RowwiseEvalState {
    fn default() -> Self {
        Self::new()
    }
}

impl RowwiseEvalState {
    pub fn new() -> Self {
        Self {
            dependencies: Vec::new(),
            index: FxHashMap::default(),
            pending: Vec::new(),
            deterministic: true,
            disable_typechecking: false,
        }
    }

    /// Positional index of `column`. The first request allocates it; later
    /// requests return the same index.
    pub fn dependency(&mut self, column: &Column) -> usize {
        if let Some(&i) = self.index.get(column) {
            return i;
        }
        let i = self.dependencies.len();
        trace!(column = ?column, index = i, "rowwise dependency");
        self.dependencies.push(column.clone());
        self.index.insert(column.clone(), i);
        i
    }

    fn argument(&mut self, column: &Column) -> EngineExpr {
        EngineExpr::argument(self.dependency(column))
    }

    /// Dependencies in index order.
    pub fn columns(&self) -> &[Column] {
        &self.dependencies
    }

    pub fn set_non_deterministic(&mut self) {
        self.deterministic = false;
    }

    pub fn deterministic(&self) -> bool {
        self.deterministic
    }

    pub fn pending(&self) -> &[PendingMaterialization] {
        &self.pending
    }
}

/// An async application already materialized into its own table, waiting
/// to be zipped onto the pass input.
#[derive(Clone, Debug)]
pub struct PendingMaterialization {
    /// Holds the call's result.
    pub column: Column,
    /// Places `column` at the temporary table's row value.
    pub storage: Storage,
    pub table: TableHandle,
}

/// Which universe a pass reads and which table its references may touch.
#[derive(Clone, Copy, Debug)]
pub struct RowwisePass<'t> {
    pub universe: Universe,
    pub restriction: Option<&'t TableRef>,
}

impl<'t> RowwisePass<'t> {
    pub fn new(universe: Universe) -> Self {
        Self {
            universe,
            restriction: None,
        }
    }

    /// Column references outside `table` are rejected.
    pub fn restricted(universe: Universe, table: &'t TableRef) -> Self {
        Self {
            universe,
            restriction: Some(table),
        }
    }
}

/// Compute the columns of `output` missing from the input storage of
/// `pass.universe`.
///
/// With `old_path`, the input row found there is carried into the result at
/// position 0, unless `output` holds only new columns.
///
/// # Panics
///
/// If an output column is neither present in the input nor computable (an
/// expression or a reference), or a dependency has no path in the input.
pub fn run_rowwise(
    ctx: &mut LowerCtx<'_>,
    pass: RowwisePass<'_>,
    output: &Storage,
    old_path: Option<ColumnPath>,
    disable_typechecking: bool,
) -> Result<TableHandle> {
    let mut input = ctx.storage(pass.universe);
    let mut table = ctx.table(input.universe());
    if output.has_only_references() {
        return Ok(table);
    }

    let mut eval = RowwiseEvalState::new();
    eval.disable_typechecking = disable_typechecking;
    let mut expressions: Vec<(EngineExpr, TableProperties)> = Vec::new();

    if let Some(old_path) = old_path {
        if !output.has_only_new_columns() {
            let placeholder = Column::materialized(pass.universe, DType::Any);
            let properties = ctx.engine.table_properties(table, &old_path)?;
            expressions.push((eval.argument(&placeholder), properties));
            input = input.with_updated_paths([(placeholder, old_path)]);
        }
    }

    let typecheck = ctx.options.runtime_typechecking && !disable_typechecking;
    for column in output.columns() {
        if input.has_column(column) {
            continue;
        }
        let expr = match column.kind() {
            ColumnKind::Expression(expr) => expr.clone(),
            ColumnKind::Reference(target) => ColumnExpr::column(target),
            _ => panic!(
                "column {column:?} in the output of {} is neither computed nor present in the input",
                pass.universe
            ),
        };
        let expr = if typecheck {
            type_verifier::verify(&expr)
        } else {
            expr
        };
        let lowered = lower_expr(ctx, pass, &expr, &mut eval)?;
        expressions.push((lowered, TableProperties::Column(column_properties(column))));
    }

    if !eval.pending.is_empty() {
        let pending = std::mem::take(&mut eval.pending);
        let mut temporaries = Vec::with_capacity(pending.len());
        for materialization in &pending {
            let properties = ctx.table_properties(&materialization.storage);
            temporaries.push(ctx.engine.override_table_universe(
                materialization.table,
                table,
                properties,
            )?);
        }
        let mut parts: Vec<&Storage> = vec![&input];
        parts.extend(pending.iter().map(|m| &m.storage));
        let merged = Storage::merge_storages(pass.universe, &parts);
        let properties = ctx.table_properties(&merged);
        table = ctx.engine.zip_tables(table, &temporaries, properties)?;
        input = merged;
    }

    let paths: Vec<ColumnPath> = eval
        .columns()
        .iter()
        .map(|column| input.get_path(column).clone())
        .collect();
    if !eval.deterministic() {
        warn!(
            universe = %pass.universe,
            "non-deterministic function in rowwise expressions, results will not be memoized"
        );
    }
    trace!(%table, dependencies = paths.len(), columns = expressions.len(), "expression_table");
    ctx.engine
        .expression_table(table, &paths, expressions, eval.deterministic())
}

/// Materialize `exprs` as fresh columns of `pass.universe` in a table of
/// their own, laid out flat.
pub fn run_subexpressions(
    ctx: &mut LowerCtx<'_>,
    pass: RowwisePass<'_>,
    exprs: &[ColumnExpr],
    disable_typechecking: bool,
) -> Result<(Vec<Column>, Storage, TableHandle)> {
    let columns: Vec<Column> = exprs
        .iter()
        .map(|expr| Column::expression(pass.universe, expr.clone()))
        .collect();
    let storage = Storage::flat(pass.universe, columns.iter().cloned()).with_only_new_columns(true);
    let table = run_rowwise(ctx, pass, &storage, None, disable_typechecking)?;
    Ok((columns, storage, table))
}

/// Lower one expression tree against the dependencies in `eval`.
///
/// # Panics
///
/// On reducers and column calls, which upstream planning removes from
/// rowwise contexts.
pub fn lower_expr(
    ctx: &mut LowerCtx<'_>,
    pass: RowwisePass<'_>,
    expr: &ColumnExpr,
    eval: &mut RowwiseEvalState,
) -> Result<EngineExpr> {
    let mut lower = |e: &ColumnExpr, eval: &mut RowwiseEvalState| lower_expr(ctx, pass, e, eval);
    match expr.kind() {
        ExprKind::ColumnRef(column) => {
            if let Some(table) = pass.restriction {
                if !table.owns(column) {
                    return Err(Error::invalid_expression(format!(
                        "column {column:?} is outside {}, the only table this context may read",
                        table.id()
                    )));
                }
            }
            Ok(eval.argument(column))
        }
        ExprKind::Const(value) => Ok(EngineExpr::constant(value.clone())),
        ExprKind::Unary { op, operand } => {
            let arg = lower(operand, eval)?;
            operator_mapping::unary(*op, arg, operand.dtype())
        }
        ExprKind::Binary { op, left, right } => {
            let (left, right) = match binary_operand_type(*op, left.dtype(), right.dtype()) {
                Some(common) => (
                    ColumnExpr::cast(common.clone(), left.clone()),
                    ColumnExpr::cast(common, right.clone()),
                ),
                None => (left.clone(), right.clone()),
            };
            let l = lower(&left, eval)?;
            let r = lower(&right, eval)?;
            operator_mapping::binary(*op, l, r, left.dtype(), right.dtype())
        }
        ExprKind::Cast { target, operand } => {
            let arg = lower(operand, eval)?;
            operator_mapping::cast(arg, operand.dtype(), target)
        }
        ExprKind::Convert { target, operand } => {
            let arg = lower(operand, eval)?;
            operator_mapping::convert(arg, operand.dtype(), target)
        }
        ExprKind::Declare { operand, .. } => lower(operand, eval),
        ExprKind::Coalesce(args) => {
            let dtype = expr.dtype();
            let mut lowered = Vec::with_capacity(args.len());
            for arg in args {
                let arg_dtype = if !dtype.accepts_none() && arg.dtype().accepts_none() {
                    DType::optional(dtype.clone())
                } else {
                    dtype.clone()
                };
                lowered.push(lower(&ColumnExpr::cast(arg_dtype, arg.clone()), eval)?);
            }
            let mut rest = lowered.pop().expect("coalesce has at least one argument");
            while let Some(arg) = lowered.pop() {
                rest = EngineExpr::if_else(EngineExpr::is_none(arg.clone()), rest, arg);
            }
            Ok(rest)
        }
        ExprKind::Require { value, guards } => {
            let mut result = lower(value, eval)?;
            let guards = guards
                .iter()
                .map(|g| lower(g, eval))
                .collect::<Result<Vec<_>>>()?;
            for guard in guards.into_iter().rev() {
                result = EngineExpr::if_else(
                    EngineExpr::is_none(guard),
                    EngineExpr::constant(Value::None),
                    result,
                );
            }
            Ok(result)
        }
        ExprKind::IfElse {
            cond,
            then,
            otherwise,
        } => {
            let dtype = expr.dtype();
            let cond = lower(cond, eval)?;
            let then = lower(&ColumnExpr::cast(dtype.clone(), then.clone()), eval)?;
            let otherwise = lower(&ColumnExpr::cast(dtype.clone(), otherwise.clone()), eval)?;
            Ok(EngineExpr::if_else(cond, then, otherwise))
        }
        ExprKind::IsNone(operand) => Ok(EngineExpr::is_none(lower(operand, eval)?)),
        ExprKind::IsNotNone(operand) => Ok(EngineExpr::unary(
            UnaryOperator::Inv,
            EngineExpr::is_none(lower(operand, eval)?),
        )),
        ExprKind::Reducer { kind, .. } => panic!(
            "reducer {} reached the rowwise pass over {}",
            kind.name(),
            pass.universe
        ),
        ExprKind::Call { .. } => panic!(
            "column call reached the rowwise pass over {}; calls must be desugared first",
            pass.universe
        ),
        ExprKind::PointerFrom {
            args,
            instance,
            optional,
        } => {
            let args = args
                .iter()
                .map(|a| lower(a, eval))
                .collect::<Result<Vec<_>>>()?;
            let instance = instance.as_ref().map(|i| lower(i, eval)).transpose()?;
            Ok(EngineExpr::pointer_from(args, instance, *optional))
        }
        ExprKind::MakeTuple(args) => {
            let args = args
                .iter()
                .map(|a| lower(a, eval))
                .collect::<Result<Vec<_>>>()?;
            Ok(EngineExpr::make_tuple(args))
        }
        ExprKind::Get {
            object,
            index,
            default,
            check_exists,
        } => {
            let json = *object.dtype().unoptionalize() == DType::Json;
            let o = lower(object, eval)?;
            let i = lower(index, eval)?;
            Ok(match (json, *check_exists) {
                (true, true) => EngineExpr::json_get_item_checked(o, i, lower(default, eval)?),
                (true, false) => EngineExpr::json_get_item_unchecked(o, i),
                (false, true) => EngineExpr::sequence_get_item_checked(o, i, lower(default, eval)?),
                (false, false) => EngineExpr::sequence_get_item_unchecked(o, i),
            })
        }
        ExprKind::MethodCall { method, args } => {
            let dtypes: Vec<DType> = args.iter().map(|a| a.dtype().clone()).collect();
            let Some(overload) = resolve_method(*method, &dtypes) else {
                let shown: Vec<String> = dtypes.iter().map(ToString::to_string).collect();
                return Err(Error::type_error(format!(
                    "no overload of {method} accepts ({})",
                    shown.join(", ")
                )));
            };
            let mut lowered = Vec::with_capacity(args.len());
            for (arg, param) in args.iter().zip(&overload.params) {
                let widen = *arg.dtype().unoptionalize() == DType::Int
                    && *param.unoptionalize() == DType::Float;
                let arg = if widen {
                    ColumnExpr::cast(param.clone(), arg.clone())
                } else {
                    arg.clone()
                };
                lowered.push(lower(&arg, eval)?);
            }
            Ok(EngineExpr::method(*method, lowered))
        }
        ExprKind::Unwrap(operand) => Ok(EngineExpr::unwrap(lower(operand, eval)?)),
        ExprKind::FillError {
            operand,
            replacement,
        } => {
            let dtype = expr.dtype();
            let operand = lower(&ColumnExpr::cast(dtype.clone(), operand.clone()), eval)?;
            let replacement = lower(&ColumnExpr::cast(dtype.clone(), replacement.clone()), eval)?;
            Ok(EngineExpr::fill_error(operand, replacement))
        }
        ExprKind::Apply(apply) => {
            let (func, args) = positional(apply);
            if !apply.deterministic {
                eval.set_non_deterministic();
            }
            let args = args
                .iter()
                .map(|a| lower(a, eval))
                .collect::<Result<Vec<_>>>()?;
            Ok(EngineExpr::apply(func, args, apply.propagate_none))
        }
        ExprKind::AsyncApply(apply) => lower_async_apply(ctx, pass, expr.dtype(), apply, eval),
    }
}

fn lower_async_apply(
    ctx: &mut LowerCtx<'_>,
    pass: RowwisePass<'_>,
    dtype: &DType,
    apply: &ApplyExpr,
    eval: &mut RowwiseEvalState,
) -> Result<EngineExpr> {
    let (func, args) = positional(apply);
    let (columns, storage, input) =
        run_subexpressions(ctx, pass, &args, eval.disable_typechecking)?;
    let paths: Vec<ColumnPath> = columns
        .iter()
        .map(|column| storage.get_path(column).clone())
        .collect();

    let result = Column::materialized(pass.universe, dtype.clone());
    let result_storage = Storage::new(pass.universe, [(result.clone(), ColumnPath::EMPTY)]);
    let properties = ctx.table_properties(&result_storage);
    let table = ctx.engine.async_apply_table(
        input,
        &paths,
        func,
        apply.propagate_none,
        apply.deterministic,
        properties,
    )?;
    ctx.state.set_temporary_table(&result_storage, table);
    if !apply.deterministic {
        eval.set_non_deterministic();
    }
    eval.pending.push(PendingMaterialization {
        column: result.clone(),
        storage: result_storage,
        table,
    });
    Ok(eval.argument(&result))
}

/// Calls the wrapped function with the trailing arguments passed by
/// keyword.
struct KeywordPacked {
    inner: CallableRef,
    positional: usize,
    names: Vec<String>,
}

impl Callable for KeywordPacked {
    fn call(&self, args: &[Value]) -> std::result::Result<Value, String> {
        let (positional, keywords) = args.split_at(self.positional.min(args.len()));
        let kwargs: Vec<(&str, Value)> = self
            .names
            .iter()
            .map(String::as_str)
            .zip(keywords.iter().cloned())
            .collect();
        self.inner.call_with_kwargs(positional, &kwargs)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// The function to call and its arguments, keyword arguments appended.
fn positional(apply: &ApplyExpr) -> (CallableRef, Vec<ColumnExpr>) {
    if apply.kwargs.is_empty() {
        return (Arc::clone(&apply.func), apply.args.clone());
    }
    let packed = KeywordPacked {
        inner: Arc::clone(&apply.func),
        positional: apply.args.len(),
        names: apply.kwargs.iter().map(|(name, _)| name.clone()).collect(),
    };
    let args = apply
        .args
        .iter()
        .cloned()
        .chain(apply.kwargs.iter().map(|(_, e)| e.clone()))
        .collect();
    (Arc::new(packed), args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_engine::callable_fn;

    #[test]
    fn dependencies_are_deduplicated() {
        let u = Universe::new();
        let a = Column::materialized(u, DType::Int);
        let b = Column::materialized(u, DType::Int);
        let mut eval = RowwiseEvalState::new();
        assert_eq!(eval.dependency(&a), 0);
        assert_eq!(eval.dependency(&b), 1);
        assert_eq!(eval.dependency(&a), 0);
        assert_eq!(eval.columns(), &[a, b]);
        assert!(eval.deterministic());
    }

    fn lowered(expr: &ColumnExpr, eval: &mut RowwiseEvalState) -> String {
        let mut engine = rivulet_engine::MemEngine::new();
        let mut state = rivulet_plan::ScopeState::new();
        let options = crate::options::LowerOptions::default();
        let mut ctx = LowerCtx::new(&mut engine, &mut state, &options);
        let pass = RowwisePass::new(Universe::new());
        format!("{:?}", lower_expr(&mut ctx, pass, expr, eval).expect("lowered"))
    }

    #[test]
    fn noop_casts_collapse() {
        let u = Universe::new();
        let a = Column::materialized(u, DType::Int);
        let once = ColumnExpr::cast(DType::Int, ColumnExpr::column(&a));
        let twice = ColumnExpr::cast(DType::Int, once.clone());
        let widened = ColumnExpr::cast(DType::optional(DType::Int), twice.clone());

        let expected = lowered(&ColumnExpr::column(&a), &mut RowwiseEvalState::new());
        assert_eq!(lowered(&once, &mut RowwiseEvalState::new()), expected);
        assert_eq!(lowered(&twice, &mut RowwiseEvalState::new()), expected);
        assert_eq!(lowered(&widened, &mut RowwiseEvalState::new()), expected);
    }

    #[test]
    fn repeated_references_share_one_argument() {
        let u = Universe::new();
        let a = Column::materialized(u, DType::Int);
        let b = Column::materialized(u, DType::Int);
        let col = |c: &Column| ColumnExpr::column(c);
        let expr = ColumnExpr::binary(
            rivulet_engine::BinaryOperator::Add,
            ColumnExpr::binary(rivulet_engine::BinaryOperator::Mul, col(&a), col(&b)),
            col(&a),
        );
        let mut eval = RowwiseEvalState::new();
        let text = lowered(&expr, &mut eval);
        assert_eq!(eval.columns(), &[a, b]);
        assert_eq!(text.matches("Argument(0)").count(), 2);
        assert_eq!(text.matches("Argument(1)").count(), 1);
    }

    fn declared_int_subpass(disable_typechecking: bool) -> (Vec<Value>, usize) {
        use rivulet_engine::Engine;
        use rivulet_types::Key;

        let u = Universe::new();
        let a = Column::materialized(u, DType::Str);
        let mut engine = rivulet_engine::MemEngine::new();
        let rows = vec![(Key(1), Value::from_tuple([Value::from("x")]))];
        let table = engine
            .static_table(rows, TableProperties::Empty)
            .expect("static table");
        let mut state = rivulet_plan::ScopeState::new();
        state.set_table(Storage::flat(u, [a.clone()]), table);
        let options = crate::options::LowerOptions::default().with_runtime_typechecking(true);

        let mut ctx = LowerCtx::new(&mut engine, &mut state, &options);
        let declared = ColumnExpr::declare(DType::Int, ColumnExpr::column(&a));
        let (_, storage, out) =
            run_subexpressions(&mut ctx, RowwisePass::new(u), &[declared], disable_typechecking)
                .expect("lowered");
        assert!(storage.has_only_new_columns());
        let cells = engine.column(out, &ColumnPath::new(vec![0])).expect("column");
        (cells, engine.error_log().len())
    }

    #[test]
    fn subexpressions_follow_the_callers_typechecking() {
        assert_eq!(declared_int_subpass(false), (vec![Value::Error], 1));
        assert_eq!(declared_int_subpass(true), (vec![Value::from("x")], 0));
    }

    struct Greeting;

    impl Callable for Greeting {
        fn call(&self, args: &[Value]) -> std::result::Result<Value, String> {
            self.call_with_kwargs(args, &[])
        }

        fn call_with_kwargs(
            &self,
            args: &[Value],
            kwargs: &[(&str, Value)],
        ) -> std::result::Result<Value, String> {
            let name = args.first().and_then(Value::as_str).unwrap_or_default();
            let punct = kwargs
                .iter()
                .find(|(k, _)| *k == "punct")
                .and_then(|(_, v)| v.as_str())
                .unwrap_or(".");
            Ok(Value::from(format!("hello {name}{punct}")))
        }
    }

    #[test]
    fn keyword_arguments_are_packed_after_positionals() {
        let u = Universe::new();
        let name = Column::materialized(u, DType::Str);
        let apply = ApplyExpr::new(Arc::new(Greeting), DType::Str)
            .arg(ColumnExpr::column(&name))
            .kwarg("punct", ColumnExpr::constant("!"));
        let (func, args) = positional(&apply);
        assert_eq!(args.len(), 2);
        let out = func.call(&[Value::from("bob"), Value::from("!")]);
        assert_eq!(out, Ok(Value::from("hello bob!")));

        let plain = ApplyExpr::new(callable_fn("id", |a| Ok(a[0].clone())), DType::Str)
            .arg(ColumnExpr::column(&name));
        let (func, _) = positional(&plain);
        assert!(Arc::ptr_eq(&func, &plain.func));
    }
}
