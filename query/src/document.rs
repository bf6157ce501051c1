/// A variable declared by a query document, e.g. `$first: Int!`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableDefinition {
    /// Variable name without the leading `$`.
    pub name: String,
    /// GraphQL type as written in the document.
    pub type_name: String,
}

impl VariableDefinition {
    /// Creates a new variable definition.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Non-null types must always be supplied.
    pub fn is_required(&self) -> bool {
        self.type_name.trim_end().ends_with('!')
    }
}

/// An immutable query document together with its declared variables.
///
/// Parsing is left to the query client. The document only records what the
/// binding needs in order to resolve variables from props.
///
/// ```
/// use leptos_graphql::*;
///
/// let document = QueryDocument::new(
///     "people",
///     "query people($first: Int!) { allPeople(first: $first) { people { name } } }",
/// )
/// .variable("first", "Int!");
///
/// assert_eq!(1, document.required_variables().count());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDocument {
    operation_name: String,
    source: String,
    variables: Vec<VariableDefinition>,
}

impl QueryDocument {
    /// Creates a document without variables.
    pub fn new(operation_name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            source: source.into(),
            variables: Vec::new(),
        }
    }

    /// Declares a variable.
    pub fn variable(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.variables.push(VariableDefinition::new(name, type_name));
        self
    }

    /// The operation name, used in error messages.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// The document source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// All declared variables in declaration order.
    pub fn variables(&self) -> &[VariableDefinition] {
        &self.variables
    }

    /// Declared variables with a non-null type.
    pub fn required_variables(&self) -> impl Iterator<Item = &VariableDefinition> {
        self.variables.iter().filter(|v| v.is_required())
    }
}
