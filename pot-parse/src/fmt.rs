#![forbid(unsafe_code)]

use pot_ast::{BinOp, Expr, ExprKind, UnaryOp};

/// Canonical text for an expression. The output parses back to the same tree.
pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    fmt_expr(&mut out, expr, Prec::Lowest);
    out
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest,
    Iff,
    Implies,
    Or,
    And,
    Not,
    Cmp,
    Add,
    Mul,
    Unary,
    Primary,
}

fn bin_prec(op: BinOp) -> Prec {
    match op {
        BinOp::Iff => Prec::Iff,
        BinOp::Implies => Prec::Implies,
        BinOp::Or => Prec::Or,
        BinOp::And => Prec::And,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => Prec::Cmp,
        BinOp::Add | BinOp::Sub => Prec::Add,
        BinOp::Mul | BinOp::Div => Prec::Mul,
    }
}

/// Precedence each operand is printed at, mirroring the parser's associativity.
fn operand_precs(op: BinOp) -> (Prec, Prec) {
    match op {
        BinOp::Iff => (Prec::Iff, Prec::Implies),
        BinOp::Implies => (Prec::Or, Prec::Implies),
        BinOp::Or => (Prec::Or, Prec::And),
        BinOp::And => (Prec::And, Prec::Not),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            (Prec::Add, Prec::Add)
        }
        BinOp::Add | BinOp::Sub => (Prec::Add, Prec::Mul),
        BinOp::Mul | BinOp::Div => (Prec::Mul, Prec::Unary),
    }
}

fn fmt_expr(out: &mut String, expr: &Expr, parent_prec: Prec) {
    match &expr.kind {
        ExprKind::Ident(id) => out.push_str(&id.node),
        ExprKind::IntLit(n) => out.push_str(&n.to_string()),
        ExprKind::DecimalLit(d) => out.push_str(&d.to_string()),
        ExprKind::BoolLit(b) => out.push_str(if *b { "true" } else { "false" }),
        ExprKind::Unary { op, expr: inner } => {
            let prec = match op {
                UnaryOp::Not => Prec::Not,
                UnaryOp::Neg => Prec::Unary,
            };
            let paren = prec < parent_prec;
            if paren {
                out.push('(');
            }
            match op {
                UnaryOp::Not => out.push_str("not "),
                UnaryOp::Neg => out.push('-'),
            }
            fmt_expr(out, inner, prec);
            if paren {
                out.push(')');
            }
        }
        ExprKind::Binary { left, op, right } => {
            let prec = bin_prec(*op);
            let (lp, rp) = operand_precs(*op);
            let paren = prec < parent_prec;
            if paren {
                out.push('(');
            }
            fmt_expr(out, left, lp);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            fmt_expr(out, right, rp);
            if paren {
                out.push(')');
            }
        }
        ExprKind::Call { callee, args } => {
            out.push_str(&callee.node);
            out.push('(');
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                fmt_expr(out, a, Prec::Lowest);
            }
            out.push(')');
        }
        ExprKind::Quant {
            kind,
            binders,
            body,
        } => {
            // The body extends as far right as possible, so any enclosing operator needs parens.
            let paren = parent_prec > Prec::Lowest;
            if paren {
                out.push('(');
            }
            out.push_str(kind.keyword());
            out.push_str(" (");
            for (i, b) in binders.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&b.name.node);
                out.push_str(": ");
                out.push_str(&b.sort.node);
            }
            out.push_str("): ");
            fmt_expr(out, body, Prec::Lowest);
            if paren {
                out.push(')');
            }
        }
    }
}
