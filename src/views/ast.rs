/// AST node types for shorthand templates
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Plain text content
    Text(String),

    /// Escaped interpolation {{ expression }}
    Output(Expression),

    /// Conditional block {{ if }}...{{ else if }}...{{ else }}...{{ end }}
    Conditional {
        condition: Expression,
        then_branch: Vec<Node>,
        else_if_branches: Vec<(Expression, Vec<Node>)>,
        else_branch: Option<Vec<Node>>,
    },

    /// Loop block {{ for item in collection }}...{{ end }}
    Loop {
        item_name: String,
        collection: Expression,
        body: Vec<Node>,
    },

    /// Partial inclusion {{ include name with { key: value } }}
    Include {
        name: String,
        variables: Vec<(String, Expression)>,
    },
}

/// Expression types for conditions and values
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// String literal
    String(String),

    /// Number literal
    Number(f64),

    /// Boolean literal
    Boolean(bool),

    /// Null literal
    Null,

    /// Variable reference
    Variable(String),

    /// Property access (e.g., user.name)
    PropertyAccess {
        object: Box<Expression>,
        property: String,
    },

    /// Index access (e.g., items[0], user['name'])
    Index {
        object: Box<Expression>,
        index: Box<Expression>,
    },

    /// Array literal
    Array(Vec<Expression>),

    /// Call to a registered function
    FunctionCall { name: String, args: Vec<Expression> },

    /// Binary operation
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    // Comparison
    Equal,
    NotEqual,
    Identical,
    NotIdentical,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical
    And,
    Or,
    Xor,

    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

/// Complete template AST
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub nodes: Vec<Node>,
}

impl Template {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Names of every partial referenced anywhere in the tree, in order of
    /// first appearance
    pub fn include_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_includes(&self.nodes, &mut names);
        names
    }
}

fn collect_includes(nodes: &[Node], names: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Include { name, .. } => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Node::Conditional {
                then_branch,
                else_if_branches,
                else_branch,
                ..
            } => {
                collect_includes(then_branch, names);
                for (_, branch) in else_if_branches {
                    collect_includes(branch, names);
                }
                if let Some(branch) = else_branch {
                    collect_includes(branch, names);
                }
            }
            Node::Loop { body, .. } => collect_includes(body, names),
            Node::Text(_) | Node::Output(_) => {}
        }
    }
}

/// Helper functions for building expressions
impl Expression {
    /// Create a property access expression from a dotted path
    #[cfg(test)]
    pub fn from_path(path: &str) -> Self {
        let mut parts = path.split('.');
        let mut expr = match parts.next() {
            Some(first) if !first.is_empty() => Expression::Variable(first.to_string()),
            _ => return Expression::Null,
        };

        for part in parts {
            expr = Expression::PropertyAccess {
                object: Box::new(expr),
                property: part.to_string(),
            };
        }

        expr
    }

    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOperator, operand: Expression) -> Self {
        Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_from_path() {
        let expr = Expression::from_path("user.profile.name");

        match expr {
            Expression::PropertyAccess { object, property } => {
                assert_eq!(property, "name");
                match *object {
                    Expression::PropertyAccess {
                        object: inner,
                        property: prop,
                    } => {
                        assert_eq!(prop, "profile");
                        match *inner {
                            Expression::Variable(var) => assert_eq!(var, "user"),
                            _ => panic!("Expected variable"),
                        }
                    }
                    _ => panic!("Expected property access"),
                }
            }
            _ => panic!("Expected property access"),
        }

        assert_eq!(Expression::from_path(""), Expression::Null);
    }

    #[test]
    fn test_include_names_walks_nested_blocks() {
        let include = |name: &str| Node::Include {
            name: name.to_string(),
            variables: Vec::new(),
        };

        let template = Template::new(vec![
            include("header"),
            Node::Loop {
                item_name: "row".to_string(),
                collection: Expression::Variable("rows".to_string()),
                body: vec![Node::Conditional {
                    condition: Expression::Boolean(true),
                    then_branch: vec![include("row")],
                    else_if_branches: vec![(Expression::Null, vec![include("header")])],
                    else_branch: Some(vec![include("empty")]),
                }],
            },
        ]);

        assert_eq!(template.include_names(), vec!["header", "row", "empty"]);
    }
}
