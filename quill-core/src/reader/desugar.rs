//! Location-preserving surface rewrites
//!
//! Every node built here copies the location of the form it was derived
//! from, so later diagnostics and source maps still point at the user's code.

use super::sexp::{Sexp, SexpKind};
use crate::error::{CompileError, CompileResult};

/// Rewrite all forms of a module
pub fn desugar_forms(forms: Vec<Sexp>) -> CompileResult<Vec<Sexp>> {
    forms.into_iter().map(desugar).collect()
}

/// Rewrite one form and its children, innermost first
pub fn desugar(form: Sexp) -> CompileResult<Sexp> {
    let form = match form.kind {
        SexpKind::List(ref items) if !items.is_empty() => {
            let children = items
                .iter()
                .cloned()
                .map(desugar)
                .collect::<CompileResult<Vec<_>>>()?;
            form.derive(SexpKind::List(children))
        }
        SexpKind::Vector(ref items) => {
            let children = items.iter().cloned().map(desugar).collect::<CompileResult<_>>()?;
            form.derive(SexpKind::Vector(children))
        }
        SexpKind::Map(ref items) => {
            let children = items.iter().cloned().map(desugar).collect::<CompileResult<_>>()?;
            form.derive(SexpKind::Map(children))
        }
        _ => return Ok(form),
    };
    rewrite(form)
}

fn rewrite(form: Sexp) -> CompileResult<Sexp> {
    let head = match form.head() {
        Some(head) => head.to_string(),
        None => return Ok(form),
    };
    let items = form.as_list().unwrap_or_default();
    match head.as_str() {
        "defn" => rewrite_defn(&form, items),
        "when" | "unless" => rewrite_when(&form, items, head == "unless"),
        "->" | "->>" => rewrite_thread(&form, items, head == "->>"),
        "cond" => rewrite_cond(&form, &items[1..]),
        _ => Ok(form),
    }
}

fn sym_like(origin: &Sexp, name: &str) -> Sexp {
    origin.derive(SexpKind::Symbol(name.to_string()))
}

fn list_like(origin: &Sexp, items: Vec<Sexp>) -> Sexp {
    origin.derive(SexpKind::List(items))
}

fn rewrite_defn(form: &Sexp, items: &[Sexp]) -> CompileResult<Sexp> {
    let name_ok = items.get(1).and_then(Sexp::as_symbol).is_some();
    let params_ok = items.get(2).and_then(Sexp::as_vector).is_some();
    if !name_ok || !params_ok {
        return Err(CompileError::parse(
            "defn requires a name and a parameter vector",
            form.location(),
            Some("write (defn name [params] body...)"),
        ));
    }
    let mut out = vec![sym_like(&items[0], "fn")];
    out.extend(items[1..].iter().cloned());
    Ok(list_like(form, out))
}

fn rewrite_when(form: &Sexp, items: &[Sexp], negate: bool) -> CompileResult<Sexp> {
    let Some(test) = items.get(1) else {
        return Err(CompileError::parse(
            format!("{} requires a test expression", items[0]),
            form.location(),
            None,
        ));
    };
    let mut body = vec![sym_like(&items[0], "do")];
    body.extend(items[2..].iter().cloned());
    let body = list_like(form, body);
    let nil = form.derive(SexpKind::Nil);
    let (then, otherwise) = if negate { (nil, body) } else { (body, nil) };
    Ok(list_like(
        form,
        vec![sym_like(&items[0], "if"), test.clone(), then, otherwise],
    ))
}

fn rewrite_thread(form: &Sexp, items: &[Sexp], last: bool) -> CompileResult<Sexp> {
    let Some(seed) = items.get(1) else {
        return Err(CompileError::parse(
            format!("{} requires an initial value", items[0]),
            form.location(),
            None,
        ));
    };
    let mut acc = seed.clone();
    for step in &items[2..] {
        acc = match step.as_list() {
            Some(call) if !call.is_empty() => {
                let mut args = call.to_vec();
                if last {
                    args.push(acc);
                } else {
                    args.insert(1, acc);
                }
                list_like(step, args)
            }
            _ => list_like(step, vec![step.clone(), acc]),
        };
    }
    Ok(acc)
}

fn rewrite_cond(form: &Sexp, clauses: &[Sexp]) -> CompileResult<Sexp> {
    if clauses.len() % 2 != 0 {
        return Err(CompileError::parse(
            "cond requires an even number of forms",
            form.location(),
            Some("pair every test with an expression, using :else for the fallback"),
        ));
    }
    let mut acc = form.derive(SexpKind::Nil);
    for pair in clauses.chunks(2).rev() {
        let (test, expr) = (&pair[0], &pair[1]);
        let is_else = matches!(&test.kind, SexpKind::Keyword(k) if k == "else");
        acc = if is_else {
            expr.clone()
        } else {
            list_like(
                test,
                vec![sym_like(test, "if"), test.clone(), expr.clone(), acc],
            )
        };
    }
    Ok(acc)
}
