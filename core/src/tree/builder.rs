//! Arena-backed construction helpers for [`Node`] trees.
//!
//! The parser builds trees directly; hosts that synthesize code (and the test
//! suite) use this builder instead. Each helper renders a source-like text for
//! the node so diagnostics stay readable.

use bumpalo::Bump;

use super::{BinaryOp, Node, NodeKind, Span, UnaryOp};

#[derive(Clone, Copy)]
pub struct TreeBuilder<'a> {
    arena: &'a Bump,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self { arena }
    }

    pub fn arena(&self) -> &'a Bump {
        self.arena
    }

    /// Build a node from its parts.
    pub fn node(&self, kind: NodeKind<'a>, text: &str, children: Vec<Node<'a>>) -> Node<'a> {
        let text = self.arena.alloc_str(text);
        Node {
            kind,
            span: Span::new(0, text.len()),
            text,
            children: self.arena.alloc_slice_fill_iter(children),
        }
    }

    /// Replace the span of a node (the builder defaults to `0..text.len()`).
    pub fn at(&self, mut node: Node<'a>, span: Span) -> Node<'a> {
        node.span = span;
        node
    }

    fn str(&self, s: &str) -> &'a str {
        self.arena.alloc_str(s)
    }

    fn joined(&self, nodes: &[Node<'a>], separator: &str) -> String {
        nodes
            .iter()
            .map(|n| n.text)
            .collect::<Vec<_>>()
            .join(separator)
    }

    // === Literals ===

    pub fn null(&self) -> Node<'a> {
        self.node(NodeKind::Null, "null", vec![])
    }

    pub fn boolean(&self, value: bool) -> Node<'a> {
        self.node(NodeKind::Boolean(value), if value { "true" } else { "false" }, vec![])
    }

    pub fn int(&self, value: i64) -> Node<'a> {
        self.node(NodeKind::Integer(value), &value.to_string(), vec![])
    }

    pub fn decimal(&self, value: f64) -> Node<'a> {
        self.node(NodeKind::Decimal(value), &value.to_string(), vec![])
    }

    pub fn string(&self, value: &str) -> Node<'a> {
        let value = self.str(value);
        self.node(NodeKind::String(value), &format!("\"{value}\""), vec![])
    }

    pub fn interpolation(&self, parts: Vec<Node<'a>>) -> Node<'a> {
        let text = format!("\"{}\"", self.joined(&parts, ""));
        self.node(NodeKind::Interpolation, &text, parts)
    }

    pub fn array(&self, elements: Vec<Node<'a>>) -> Node<'a> {
        let text = format!("[{}]", self.joined(&elements, ", "));
        self.node(NodeKind::Array, &text, elements)
    }

    /// Struct literal from `(key, value)` pairs.
    pub fn structure(&self, pairs: Vec<(Node<'a>, Node<'a>)>) -> Node<'a> {
        let text = format!(
            "{{{}}}",
            pairs
                .iter()
                .map(|(k, v)| format!("{}: {}", k.text, v.text))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let children = pairs.into_iter().flat_map(|(k, v)| [k, v]).collect();
        self.node(NodeKind::Struct, &text, children)
    }

    // === Expressions ===

    pub fn ident(&self, name: &str) -> Node<'a> {
        let name = self.str(name);
        self.node(NodeKind::Identifier(name), name, vec![])
    }

    pub fn binary(&self, op: BinaryOp, left: Node<'a>, right: Node<'a>) -> Node<'a> {
        let text = format!("{} {} {}", left.text, op, right.text);
        self.node(NodeKind::Binary(op), &text, vec![left, right])
    }

    pub fn unary(&self, op: UnaryOp, operand: Node<'a>) -> Node<'a> {
        let text = format!("{}{}", op, operand.text);
        self.node(NodeKind::Unary(op), &text, vec![operand])
    }

    pub fn ternary(&self, condition: Node<'a>, then: Node<'a>, otherwise: Node<'a>) -> Node<'a> {
        let text = format!("{} ? {} : {}", condition.text, then.text, otherwise.text);
        self.node(NodeKind::Ternary, &text, vec![condition, then, otherwise])
    }

    pub fn assign(&self, target: Node<'a>, value: Node<'a>) -> Node<'a> {
        let text = format!("{} = {}", target.text, value.text);
        self.node(NodeKind::Assignment, &text, vec![target, value])
    }

    pub fn dot(&self, object: Node<'a>, name: &str) -> Node<'a> {
        let name = self.str(name);
        let text = format!("{}.{}", object.text, name);
        self.node(NodeKind::DotAccess { name, safe: false }, &text, vec![object])
    }

    pub fn safe_dot(&self, object: Node<'a>, name: &str) -> Node<'a> {
        let name = self.str(name);
        let text = format!("{}?.{}", object.text, name);
        self.node(NodeKind::DotAccess { name, safe: true }, &text, vec![object])
    }

    pub fn index(&self, object: Node<'a>, index: Node<'a>) -> Node<'a> {
        let text = format!("{}[{}]", object.text, index.text);
        self.node(NodeKind::IndexAccess { safe: false }, &text, vec![object, index])
    }

    pub fn arg(&self, value: Node<'a>) -> Node<'a> {
        let text = value.text.to_string();
        self.node(NodeKind::Argument { name: None }, &text, vec![value])
    }

    pub fn named_arg(&self, name: &str, value: Node<'a>) -> Node<'a> {
        let name = self.str(name);
        let text = format!("{}={}", name, value.text);
        self.node(NodeKind::Argument { name: Some(name) }, &text, vec![value])
    }

    /// Function invocation with positional arguments.
    pub fn call(&self, name: &str, args: Vec<Node<'a>>) -> Node<'a> {
        let args: Vec<_> = args.into_iter().map(|a| self.arg(a)).collect();
        self.call_with(name, args)
    }

    /// Function invocation with prebuilt `Argument` nodes.
    pub fn call_with(&self, name: &str, args: Vec<Node<'a>>) -> Node<'a> {
        let name = self.str(name);
        let text = format!("{}({})", name, self.joined(&args, ", "));
        self.node(NodeKind::FunctionCall { name }, &text, args)
    }

    pub fn method(&self, object: Node<'a>, name: &str, args: Vec<Node<'a>>) -> Node<'a> {
        let name = self.str(name);
        let args: Vec<_> = args.into_iter().map(|a| self.arg(a)).collect();
        let text = format!("{}.{}({})", object.text, name, self.joined(&args, ", "));
        let mut children = vec![object];
        children.extend(args);
        self.node(NodeKind::MethodCall { name, safe: false }, &text, children)
    }

    pub fn new_object(&self, class: &str, args: Vec<Node<'a>>) -> Node<'a> {
        let class = self.str(class);
        let args: Vec<_> = args.into_iter().map(|a| self.arg(a)).collect();
        let text = format!("new {}({})", class, self.joined(&args, ", "));
        self.node(NodeKind::New { class }, &text, args)
    }

    pub fn param(&self, name: &str, required: bool, default: Option<Node<'a>>) -> Node<'a> {
        let name = self.str(name);
        let text = match &default {
            Some(d) => format!("{}={}", name, d.text),
            None if required => format!("required {name}"),
            None => name.to_string(),
        };
        self.node(
            NodeKind::ArgumentDeclaration { name, required },
            &text,
            default.into_iter().collect(),
        )
    }

    pub fn closure(&self, params: Vec<Node<'a>>, body: Node<'a>) -> Node<'a> {
        let text = format!("function({}) {}", self.joined(&params, ", "), body.text);
        let mut children = params;
        children.push(body);
        self.node(NodeKind::Closure, &text, children)
    }

    pub fn lambda(&self, params: Vec<Node<'a>>, body: Node<'a>) -> Node<'a> {
        let text = format!("({}) -> {}", self.joined(&params, ", "), body.text);
        let mut children = params;
        children.push(body);
        self.node(NodeKind::Lambda, &text, children)
    }

    // === Statements ===

    pub fn expr_stmt(&self, expr: Node<'a>) -> Node<'a> {
        let text = format!("{};", expr.text);
        self.node(NodeKind::ExpressionStatement, &text, vec![expr])
    }

    pub fn block(&self, statements: Vec<Node<'a>>) -> Node<'a> {
        let text = format!("{{ {} }}", self.joined(&statements, " "));
        self.node(NodeKind::Block, &text, statements)
    }

    pub fn if_else(&self, condition: Node<'a>, then: Node<'a>, otherwise: Option<Node<'a>>) -> Node<'a> {
        let text = match &otherwise {
            Some(e) => format!("if ({}) {} else {}", condition.text, then.text, e.text),
            None => format!("if ({}) {}", condition.text, then.text),
        };
        let mut children = vec![condition, then];
        children.extend(otherwise);
        self.node(NodeKind::If, &text, children)
    }

    pub fn while_loop(&self, label: Option<&str>, condition: Node<'a>, body: Node<'a>) -> Node<'a> {
        let label = label.map(|l| self.str(l));
        let text = format!("while ({}) {}", condition.text, body.text);
        self.node(NodeKind::While { label }, &text, vec![condition, body])
    }

    pub fn for_in(&self, var: &str, collection: Node<'a>, body: Node<'a>) -> Node<'a> {
        let var = self.str(var);
        let text = format!("for ({} in {}) {}", var, collection.text, body.text);
        self.node(NodeKind::ForIn { var, label: None }, &text, vec![collection, body])
    }

    pub fn brk(&self, label: Option<&str>) -> Node<'a> {
        let label = label.map(|l| self.str(l));
        self.node(NodeKind::Break { label }, "break;", vec![])
    }

    pub fn cont(&self, label: Option<&str>) -> Node<'a> {
        let label = label.map(|l| self.str(l));
        self.node(NodeKind::Continue { label }, "continue;", vec![])
    }

    pub fn ret(&self, value: Option<Node<'a>>) -> Node<'a> {
        let text = match &value {
            Some(v) => format!("return {};", v.text),
            None => "return;".to_string(),
        };
        self.node(NodeKind::Return, &text, value.into_iter().collect())
    }

    pub fn throw(&self, value: Node<'a>) -> Node<'a> {
        let text = format!("throw {};", value.text);
        self.node(NodeKind::Throw, &text, vec![value])
    }

    pub fn try_catch(
        &self,
        body: Node<'a>,
        catch: Option<(&str, Node<'a>)>,
        finally: Option<Node<'a>>,
    ) -> Node<'a> {
        let mut text = format!("try {}", body.text);
        let mut children = vec![body];
        let mut catch_var = None;
        if let Some((var, handler)) = catch {
            text.push_str(&format!(" catch ({}) {}", var, handler.text));
            catch_var = Some(self.str(var));
            children.push(handler);
        }
        if let Some(finally) = finally {
            text.push_str(&format!(" finally {}", finally.text));
            children.push(finally);
        }
        self.node(NodeKind::Try { catch_var }, &text, children)
    }

    pub fn function(&self, name: &str, params: Vec<Node<'a>>, body: Vec<Node<'a>>) -> Node<'a> {
        let name = self.str(name);
        let body = self.block(body);
        let text = format!("function {}({}) {}", name, self.joined(&params, ", "), body.text);
        let mut children = params;
        children.push(body);
        self.node(NodeKind::FunctionDeclaration { name }, &text, children)
    }

    pub fn component(&self, name: &str) -> Node<'a> {
        let name = self.str(name);
        let text = format!("<bx:{name}>");
        self.node(NodeKind::Component { name }, &text, vec![])
    }

    // === Roots ===

    pub fn script(&self, statements: Vec<Node<'a>>) -> Node<'a> {
        let text = self.joined(&statements, "\n");
        self.node(NodeKind::Script, &text, statements)
    }

    pub fn class(&self, name: &str, body: Vec<Node<'a>>) -> Node<'a> {
        let name = self.str(name);
        let text = format!("class {} {{ {} }}", name, self.joined(&body, " "));
        self.node(NodeKind::Class { name }, &text, body)
    }

    /// Move a finished root into the arena so it can be borrowed for `'a`.
    pub fn alloc(&self, node: Node<'a>) -> &'a Node<'a> {
        self.arena.alloc(node)
    }
}
