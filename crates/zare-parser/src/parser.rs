//! Template parser for Zare.
//!
//! A `Parser` walks one token stream. `parse` runs the setup statements
//! (`use`, `as … import`, `link`, `import`, `fn`) and renders the
//! `serve ( … )` body; `parse_body` renders a bare body (branch, loop or slot
//! content). Components, slots, branches and loops are handed to child
//! parsers as [`RenderTask`]s that share the caller's [`Session`].
//!
//! Output still contains `@( … )` references; the owner of the parameters
//! substitutes them (`substitute_parameters`) once the fragment is complete.
//! Values inserted that way are shielded so no later pass re-reads them, and
//! `render` restores them on the finished document.

use std::path::Path;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use zare_lexer::{
    is_raw_text_element, is_void_element, Keyword, Location, Scanner, Token, TokenKind,
};

use crate::call::{invoke_function_call, split_call};
use crate::coerce::{truthy, type_of};
use crate::evaluator::{evaluate, EvalError, Environment};
use crate::function::Function;
use crate::link::{link_static, with_asset_extension};
use crate::modules;
use crate::params::{
    lookup, shield, stringify, substitute_parameters, unquote, unshield, Params,
};
use crate::session::{ComponentDef, ComponentId, ScopeSet, Session};
use crate::stack::{Open, Stack};
use crate::ParseError;

static OPENING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<([A-Za-z0-9_-]+)([^>]*?)/?>$").unwrap());
static CLOSING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^</\s*([A-Za-z0-9_-]+)\s*>$").unwrap());
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z0-9_-]+)=(?:"([^"]*)"|@\(([^)]*)\))"#).unwrap()
});
static COMPONENT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[:.]?[./]?[\w.\-/ ]*$").unwrap());
static ASSET_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\.?/").unwrap());

const SETUP_KEYWORDS: &str = "'use', 'as', 'import', 'link', 'fn' or 'serve'";
const RESERVED_FUNCTION_NAMES: [&str; 3] = ["if", "else", "each"];
const LOOP_INDEX: &str = "_i";

/// Nested work handed to a child parser.
#[derive(Debug)]
enum RenderTask {
    /// Invoke an imported component with a full parameter bag.
    Component { id: ComponentId, params: Params },
    /// Content between a component's tags, rendered in the caller's context.
    Slot(Vec<Token>),
    /// The selected `@if`/`@else` block.
    Branch(String),
    /// An `@each` block over `items`.
    Each {
        items: Vec<Value>,
        binding: String,
        block: String,
    },
}

impl RenderTask {
    fn name(&self) -> &'static str {
        match self {
            RenderTask::Component { .. } => "component",
            RenderTask::Slot(_) => "slot",
            RenderTask::Branch(_) => "branch",
            RenderTask::Each { .. } => "each",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Asset {
    Stylesheet,
    Script,
}

impl Asset {
    fn extension(self) -> &'static str {
        match self {
            Asset::Stylesheet => "css",
            Asset::Script => "js",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Asset::Stylesheet => "stylesheet",
            Asset::Script => "script",
        }
    }
}

/// Zare template parser.
pub struct Parser<'s, 'r> {
    session: &'s mut Session<'r>,
    tokens: Rc<[Token]>,
    pos: usize,
    parameters: Params,
    scopes: ScopeSet,
    stack: Stack,
    file_path: String,
}

impl<'s, 'r> Parser<'s, 'r> {
    /// Create a top-level parser with fresh scopes.
    pub fn new(
        session: &'s mut Session<'r>,
        tokens: Vec<Token>,
        parameters: Params,
        file_path: &str,
    ) -> Self {
        let scopes = session.root_scopes();
        Self::with_scopes(session, tokens.into(), parameters, scopes, file_path)
    }

    fn with_scopes(
        session: &'s mut Session<'r>,
        tokens: Rc<[Token]>,
        parameters: Params,
        scopes: ScopeSet,
        file_path: &str,
    ) -> Self {
        Self {
            session,
            tokens,
            pos: 0,
            parameters,
            scopes,
            stack: Stack::new(),
            file_path: file_path.to_string(),
        }
    }

    pub fn parameters(&self) -> &Params {
        &self.parameters
    }

    pub fn scopes(&self) -> ScopeSet {
        self.scopes
    }

    /// Run the setup statements and render the `serve` body, then link the
    /// registered stylesheets and scripts into the page head.
    pub fn parse(&mut self) -> Result<String, ParseError> {
        let mut html = String::new();

        while let Some(token) = self.peek().cloned() {
            match token.kind {
                TokenKind::Escape => self.advance(),
                TokenKind::Keyword(Keyword::Use) => self.use_module()?,
                TokenKind::Keyword(Keyword::As) => self.import_component()?,
                TokenKind::Keyword(Keyword::Link) => self.link_asset(Asset::Stylesheet)?,
                TokenKind::Keyword(Keyword::Import) => self.link_asset(Asset::Script)?,
                TokenKind::Keyword(Keyword::Fn) => self.declare_function()?,
                TokenKind::Keyword(Keyword::Serve) => html.push_str(&self.serve()?),
                TokenKind::Keyword(keyword) => {
                    return Err(unexpected(
                        &format!("Unexpected keyword {keyword}"),
                        SETUP_KEYWORDS,
                        &token,
                    ));
                }
                _ => return Err(unexpected("Expected a keyword", SETUP_KEYWORDS, &token)),
            }
        }

        self.link_static(&html)
    }

    /// Render a bare body: every token until the stream ends.
    pub fn parse_body(&mut self) -> Result<String, ParseError> {
        self.body(false)
    }

    /// Re-run the whole template with `params` and substitute them into the
    /// output. Components are invoked this way.
    pub fn update_parameters(&mut self, params: Params) -> Result<String, ParseError> {
        self.parameters = params;
        self.pos = 0;
        self.stack.clear();
        let html = self.parse()?;
        Ok(self.substitute_parameters(&html))
    }

    /// Render the template as a whole document: parse, substitute and restore
    /// any `@(` that arrived through parameter data.
    pub fn render(&mut self) -> Result<String, ParseError> {
        let html = self.parse()?;
        Ok(unshield(&self.substitute_parameters(&html)))
    }

    /// Replace `@( … )` references in `html` with this parser's parameters.
    pub fn substitute_parameters(&self, html: &str) -> String {
        substitute_parameters(html, &self.parameters)
    }

    /// Resolve a whole string as one parameter path.
    pub fn resolve_parameter_path(&self, path: &str) -> Option<Value> {
        lookup(&self.parameters, path)
    }

    /// Evaluate an `@if` condition. Surrounding parens are optional.
    pub fn evaluate_condition(&self, condition: &str) -> Result<bool, EvalError> {
        let condition = condition.trim();
        let inner = condition
            .strip_prefix('(')
            .and_then(|c| c.strip_suffix(')'))
            .unwrap_or(condition);
        Ok(truthy(&evaluate(inner, self)?))
    }

    // =========================================================================
    // Setup statements
    // =========================================================================

    /// `use <module>`
    fn use_module(&mut self) -> Result<(), ParseError> {
        self.advance();
        let name = self.expect(TokenKind::Text, "Expected a module name", "module name")?;
        let Some(module) = modules::module(&name.value) else {
            return Err(ParseError::template(
                format!("Unknown module usage: `{}` is not a module", name.value),
                &name,
            ));
        };

        for &(function, call) in module.functions {
            self.session.functions.define(
                self.scopes.functions,
                function,
                Rc::new(Function::Builtin {
                    name: function,
                    call,
                }),
            );
        }
        tracing::debug!(module = module.name, "registered module");
        Ok(())
    }

    /// `as <Name> import "<path>"`
    fn import_component(&mut self) -> Result<(), ParseError> {
        self.advance();
        let name = self.expect(TokenKind::Text, "Expected a component name", "component name")?;
        self.expect(TokenKind::Keyword(Keyword::Import), "Expected 'import'", "'import'")?;
        let path_token = self.expect(TokenKind::String, "Expected a component path", "quoted path")?;
        let path = unquote(&path_token.value)
            .filter(|path| COMPONENT_PATH.is_match(path))
            .ok_or_else(|| {
                ParseError::template(
                    format!("Invalid component path {}", path_token.value),
                    &path_token,
                )
            })?;

        if self
            .session
            .components
            .lookup_local(self.scopes.components, &name.value)
            .is_some()
        {
            return Ok(());
        }

        let resolved = self
            .session
            .resolver()
            .resolve(Path::new(&self.file_path), path)
            .map_err(|e| ParseError::template(e.to_string(), &path_token))?;
        let file_path = resolved.path.to_string_lossy().into_owned();
        let tokens = Scanner::tokenize(&resolved.source, &file_path)?;
        tracing::debug!(component = %name.value, path = %file_path, "imported component");

        let scopes = self.session.component_scopes(self.scopes);
        let id = self.session.define_component(ComponentDef {
            name: name.value.clone(),
            tokens: tokens.into(),
            file_path,
            scopes,
        });
        self.session
            .components
            .define(self.scopes.components, name.value, id);
        Ok(())
    }

    /// `link "<path>"` and `import "<path>"`. Registered at the root of the
    /// scope chain, so a component's assets end up on the page that uses it.
    fn link_asset(&mut self, asset: Asset) -> Result<(), ParseError> {
        self.advance();
        let token = self.expect(
            TokenKind::String,
            &format!("Expected a {} path", asset.noun()),
            "quoted path",
        )?;
        let path = unquote(&token.value)
            .filter(|path| ASSET_PATH.is_match(path))
            .ok_or_else(|| {
                ParseError::template(
                    format!("Invalid {} path {}", asset.noun(), token.value),
                    &token,
                )
            })?;
        let path = with_asset_extension(path, asset.extension());

        let arena = match asset {
            Asset::Stylesheet => &mut self.session.links,
            Asset::Script => &mut self.session.scripts,
        };
        let scope = match asset {
            Asset::Stylesheet => self.scopes.links,
            Asset::Script => self.scopes.scripts,
        };
        let root = arena.root(scope);
        arena.define(root, path.clone(), path);
        Ok(())
    }

    /// `fn <name>(<params>) { <body> }`
    fn declare_function(&mut self) -> Result<(), ParseError> {
        self.advance();
        let name = self.expect(TokenKind::Text, "Expected a function name", "function name")?;
        if RESERVED_FUNCTION_NAMES.contains(&name.value.as_str()) {
            return Err(ParseError::template(
                "Can not assign keywords as identifiers",
                &name,
            ));
        }
        self.expect(TokenKind::LParen, "Expected '('", "'('")?;

        let mut params = Vec::new();
        loop {
            let Some(token) = self.peek().cloned() else {
                return Err(self.unexpected_end("Expected ')'", "')'"));
            };
            self.advance();
            match token.kind {
                TokenKind::RParen => break,
                TokenKind::Text => params.push(token.value),
                TokenKind::Escape => {}
                TokenKind::Unknown if token.value == "," => {}
                _ => return Err(unexpected("Expected a parameter name", "parameter name", &token)),
            }
        }

        let body = self.expect(TokenKind::CodeBlock, "Expected '{'", "'{'")?;
        let function = Function::compile(name.value.as_str(), params, &body.value)
            .map_err(|e| ParseError::template(e.to_string(), &body))?;
        tracing::debug!(function = function.name(), "declared function");
        self.session
            .functions
            .define(self.scopes.functions, name.value, Rc::new(function));
        Ok(())
    }

    /// `serve ( … )`
    fn serve(&mut self) -> Result<String, ParseError> {
        self.advance();
        let paren = self.expect(TokenKind::LParen, "Expected '(' after serve", "'('")?;
        self.stack.push(Open::Paren(paren));
        self.body(true)
    }

    fn link_static(&self, html: &str) -> Result<String, ParseError> {
        let stylesheets: Vec<String> = self
            .session
            .links
            .entries(self.scopes.links)
            .map(|(_, path)| path.clone())
            .collect();
        let scripts: Vec<String> = self
            .session
            .scripts
            .entries(self.scopes.scripts)
            .map(|(_, path)| path.clone())
            .collect();

        link_static(html, &stylesheets, &scripts).map_err(|e| {
            ParseError::runtime(e.to_string(), Location::new(self.file_path.as_str(), 1, 1))
        })
    }

    // =========================================================================
    // Body
    // =========================================================================

    /// Render tokens until the stream ends or, for a `serve` body, until the
    /// paren that closes it.
    fn body(&mut self, serve: bool) -> Result<String, ParseError> {
        let base = self.stack.len();
        let tokens = Rc::clone(&self.tokens);
        let mut html = String::new();

        while let Some(token) = tokens.get(self.pos) {
            match token.kind {
                TokenKind::Escape
                | TokenKind::Text
                | TokenKind::String
                | TokenKind::Doctype
                | TokenKind::ParameterExpression
                | TokenKind::Unknown => {
                    html.push_str(&token.value);
                    self.advance();
                }
                TokenKind::LParen => {
                    self.stack.push(Open::Paren(token.clone()));
                    html.push_str(&token.value);
                    self.advance();
                }
                TokenKind::RParen => {
                    self.advance();
                    let depth = self.stack.len();
                    match self.stack.peek() {
                        Some(Open::Paren(_)) if depth > base => {
                            self.stack.pop();
                            html.push_str(&token.value);
                        }
                        Some(Open::Paren(_)) if serve && depth == base => {
                            self.stack.pop();
                            return Ok(html);
                        }
                        _ => html.push_str(&token.value),
                    }
                }
                TokenKind::OpeningTag => {
                    self.advance();
                    html.push_str(&self.opening_tag(token)?);
                }
                TokenKind::ClosingTag => {
                    self.advance();
                    self.closing_tag(token, base)?;
                    html.push_str(&token.value);
                }
                TokenKind::SelfClosingTag => {
                    self.advance();
                    html.push_str(&self.self_closing_tag(token)?);
                }
                TokenKind::FunctionCall => {
                    self.advance();
                    html.push_str(&self.function_call(token)?);
                }
                TokenKind::Keyword(Keyword::If) => {
                    self.advance();
                    html.push_str(&self.conditional(token)?);
                }
                TokenKind::Keyword(Keyword::Each) => {
                    self.advance();
                    html.push_str(&self.each(token)?);
                }
                TokenKind::Keyword(Keyword::Else) => {
                    return Err(unexpected("Unexpected @else", "'@if' before '@else'", token));
                }
                TokenKind::Keyword(keyword) => {
                    return Err(unexpected(
                        &format!("Unexpected keyword {keyword}"),
                        "markup",
                        token,
                    ));
                }
                TokenKind::Condition | TokenKind::EachExpression | TokenKind::CodeBlock => {
                    return Err(unexpected("Unexpected token", "markup", token));
                }
            }
        }

        while self.stack.len() > base {
            if let Some(Open::Tag { name, token }) = self.stack.pop() {
                return Err(ParseError::template(format!("Unclosed tag <{name}>"), &token));
            }
        }
        if serve {
            if let Some(open) = self.stack.pop() {
                return Err(ParseError::template(
                    "Missing ')' to close serve",
                    open.token(),
                ));
            }
        }
        Ok(html)
    }

    fn opening_tag(&mut self, token: &Token) -> Result<String, ParseError> {
        let Some((name, attributes)) = tag_parts(&token.value) else {
            return Ok(token.value.clone());
        };

        if is_raw_text_element(name) {
            return self.raw_element(token, name);
        }

        if let Some(id) = self.component(name) {
            let slot = self.collect_slot(token, name)?;
            let mut params = self.attributes(attributes);
            let slot = self.run(RenderTask::Slot(slot), token)?;
            params.insert("slot".to_string(), Value::String(slot));
            params.extend(self.parameters.clone());
            return self.run(RenderTask::Component { id, params }, token);
        }

        if !is_void_element(name) {
            self.stack.push(Open::Tag {
                name: name.to_string(),
                token: token.clone(),
            });
        }
        Ok(token.value.clone())
    }

    /// `<style>`/`<script>`: copied through the matching closing tag.
    fn raw_element(&mut self, token: &Token, name: &str) -> Result<String, ParseError> {
        let tokens = Rc::clone(&self.tokens);
        let mut html = token.value.clone();

        while let Some(next) = tokens.get(self.pos) {
            self.advance();
            html.push_str(&next.value);
            if next.kind == TokenKind::ClosingTag
                && closing_name(&next.value).is_some_and(|n| n.eq_ignore_ascii_case(name))
            {
                return Ok(html);
            }
        }

        Err(ParseError::template(
            format!("Missing closing {name} tag"),
            token,
        ))
    }

    fn closing_tag(&mut self, token: &Token, base: usize) -> Result<(), ParseError> {
        let Some(name) = closing_name(&token.value) else {
            return Ok(());
        };

        // Unbalanced parens in text never close.
        while self.stack.len() > base && matches!(self.stack.peek(), Some(Open::Paren(_))) {
            self.stack.pop();
        }

        let open = if self.stack.len() > base {
            self.stack.pop()
        } else {
            None
        };
        match open {
            Some(Open::Tag { name: open, .. }) if open == name => Ok(()),
            Some(other) => Err(ParseError::template(
                format!(
                    "expecting the closing tag for {} but got </{name}>",
                    other.describe()
                ),
                token,
            )),
            None => Err(ParseError::template(
                format!("Unwanted tag </{name}>"),
                token,
            )),
        }
    }

    fn self_closing_tag(&mut self, token: &Token) -> Result<String, ParseError> {
        if let Some((name, attributes)) = tag_parts(&token.value) {
            if let Some(id) = self.component(name) {
                let params = self.attributes(attributes);
                return self.run(RenderTask::Component { id, params }, token);
            }
        }
        Ok(token.value.clone())
    }

    /// Tokens up to the closing tag matching `name`, which is consumed.
    fn collect_slot(&mut self, token: &Token, name: &str) -> Result<Vec<Token>, ParseError> {
        let start = self.pos;
        let mut depth = 0usize;

        for (i, next) in self.tokens.iter().enumerate().skip(start) {
            match next.kind {
                TokenKind::OpeningTag if tag_parts(&next.value).is_some_and(|(n, _)| n == name) => {
                    depth += 1;
                }
                TokenKind::ClosingTag if closing_name(&next.value) == Some(name) => {
                    if depth == 0 {
                        let slot = self.tokens[start..i].to_vec();
                        self.pos = i + 1;
                        return Ok(slot);
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }

        Err(ParseError::template(
            format!("Unended component <{name}>"),
            token,
        ))
    }

    /// `name="value"` pairs plus unquoted `name=@(path)` references, both
    /// resolved against this parser's parameters.
    fn attributes(&self, source: &str) -> Params {
        ATTRIBUTE
            .captures_iter(source)
            .map(|captures| {
                let value = match (captures.get(2), captures.get(3)) {
                    (Some(text), _) => Value::String(self.substitute_parameters(text.as_str())),
                    (None, Some(path)) => self
                        .resolve_parameter_path(path.as_str())
                        .unwrap_or(Value::Null),
                    (None, None) => Value::Null,
                };
                (captures[1].to_string(), value)
            })
            .collect()
    }

    fn function_call(&self, token: &Token) -> Result<String, ParseError> {
        if let Some((name, _)) = split_call(&token.value) {
            if self.session.function(self.scopes.functions, name).is_none() {
                return Err(ParseError::runtime(
                    format!("`{name}` is not a function"),
                    token.location(),
                ));
            }
        }
        let value =
            invoke_function_call(&token.value, self).map_err(|e| eval_error(e, token))?;
        Ok(shield(&stringify(Some(&value))))
    }

    /// `@if (cond) { … }` with an optional `@else { … }`.
    fn conditional(&mut self, keyword: &Token) -> Result<String, ParseError> {
        let condition = self.expect(TokenKind::Condition, "Expected an if condition", "if condition")?;
        let holds = self
            .evaluate_condition(&condition.value)
            .map_err(|e| eval_error(e, &condition))?;
        let then_block = self.expect(TokenKind::CodeBlock, "Expected a block after @if", "'{ }'")?;

        let mark = self.pos;
        self.skip_escapes();
        let else_block = if self.at(TokenKind::Keyword(Keyword::Else)) {
            self.advance();
            let after_else = self.pos;
            self.skip_escapes();
            match self.peek() {
                Some(block) if block.kind == TokenKind::CodeBlock => {
                    let block = block.value.clone();
                    self.advance();
                    Some(block)
                }
                _ => {
                    self.pos = after_else;
                    None
                }
            }
        } else {
            // Whitespace after a lone if-block belongs to the output.
            self.pos = mark;
            None
        };

        let block = if holds { Some(then_block.value) } else { else_block };
        match block {
            Some(block) => self.run(RenderTask::Branch(block), keyword),
            None => Ok(String::new()),
        }
    }

    /// `@each (path:binding) { … }`
    fn each(&mut self, keyword: &Token) -> Result<String, ParseError> {
        let expression = self.expect(
            TokenKind::EachExpression,
            "Expected a loop expression",
            "(array:binding)",
        )?;
        let inner = expression
            .value
            .strip_prefix('(')
            .and_then(|e| e.strip_suffix(')'))
            .unwrap_or(&expression.value);
        let Some((path, binding)) = inner.split_once(':') else {
            return Err(unexpected(
                "Expected a loop expression",
                "(array:binding)",
                &expression,
            ));
        };

        let binding = binding.trim();
        if binding == LOOP_INDEX {
            return Err(ParseError::syntax(
                format!("`{LOOP_INDEX}` is reserved for the loop index"),
                "binding name",
                binding,
                expression.location(),
            ));
        }
        if binding.is_empty() || !binding.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ParseError::syntax(
                "Expected a binding name",
                "binding name",
                binding,
                expression.location(),
            ));
        }

        let items = match self.resolve_parameter_path(path) {
            Some(Value::Array(items)) => items,
            other => {
                return Err(ParseError::runtime(
                    format!(
                        "expecting an array, got {}",
                        other.as_ref().map_or("undefined", type_of)
                    ),
                    expression.location(),
                ));
            }
        };
        let block = self.expect(TokenKind::CodeBlock, "Expected a block after @each", "'{ }'")?;

        self.run(
            RenderTask::Each {
                items,
                binding: binding.to_string(),
                block: block.value,
            },
            keyword,
        )
    }

    // =========================================================================
    // Render tasks
    // =========================================================================

    fn run(&mut self, task: RenderTask, at: &Token) -> Result<String, ParseError> {
        if !self.session.enter() {
            return Err(ParseError::runtime(
                format!(
                    "Maximum render depth of {} exceeded",
                    self.session.max_depth()
                ),
                at.location(),
            ));
        }
        tracing::trace!(task = task.name(), depth = self.session.depth(), "render task");

        let result = self.run_task(task, at);
        self.session.leave();
        result
    }

    fn run_task(&mut self, task: RenderTask, at: &Token) -> Result<String, ParseError> {
        match task {
            RenderTask::Component { id, params } => {
                let def = self
                    .session
                    .component(id)
                    .cloned()
                    .ok_or_else(|| ParseError::template("Unknown component", at))?;
                tracing::debug!(
                    component = %def.name,
                    file = %def.file_path,
                    "rendering component"
                );
                Parser::with_scopes(
                    &mut *self.session,
                    def.tokens,
                    Params::new(),
                    def.scopes,
                    &def.file_path,
                )
                .update_parameters(params)
            }
            RenderTask::Slot(tokens) => {
                let html = Parser::with_scopes(
                    &mut *self.session,
                    tokens.into(),
                    self.parameters.clone(),
                    self.scopes,
                    &self.file_path,
                )
                .parse_body()?;
                Ok(self.substitute_parameters(&html))
            }
            RenderTask::Branch(block) => {
                let tokens = Scanner::tokenize_body(&block, &self.file_path)?;
                let scopes = self.session.block_scopes(self.scopes);
                Parser::with_scopes(
                    &mut *self.session,
                    tokens.into(),
                    self.parameters.clone(),
                    scopes,
                    &self.file_path,
                )
                .parse_body()
            }
            RenderTask::Each {
                items,
                binding,
                block,
            } => self.render_each(items, &binding, &block),
        }
    }

    /// A block without control flow, calls or components is rendered once
    /// and substituted per item; anything else is rendered per item.
    fn render_each(
        &mut self,
        items: Vec<Value>,
        binding: &str,
        block: &str,
    ) -> Result<String, ParseError> {
        let tokens: Rc<[Token]> = Scanner::tokenize_body(block, &self.file_path)?.into();
        let scopes = self.session.block_scopes(self.scopes);
        let render_once = !tokens.iter().any(|t| self.is_dynamic(t, scopes));
        tracing::debug!(items = items.len(), render_once, "rendering loop");

        let mut html = String::new();
        if render_once {
            let fragment = Parser::with_scopes(
                &mut *self.session,
                tokens,
                self.parameters.clone(),
                scopes,
                &self.file_path,
            )
            .parse_body()?;
            for (i, item) in items.into_iter().enumerate() {
                let params = self.iteration(binding, item, i);
                html.push_str(&substitute_parameters(&fragment, &params));
            }
        } else {
            for (i, item) in items.into_iter().enumerate() {
                let params = self.iteration(binding, item, i);
                let fragment = Parser::with_scopes(
                    &mut *self.session,
                    Rc::clone(&tokens),
                    params.clone(),
                    scopes,
                    &self.file_path,
                )
                .parse_body()?;
                html.push_str(&substitute_parameters(&fragment, &params));
            }
        }
        Ok(html)
    }

    fn iteration(&self, binding: &str, item: Value, index: usize) -> Params {
        let mut params = self.parameters.clone();
        params.insert(binding.to_string(), item);
        params.insert(LOOP_INDEX.to_string(), Value::from(index));
        params
    }

    fn is_dynamic(&self, token: &Token, scopes: ScopeSet) -> bool {
        match token.kind {
            TokenKind::Keyword(_) | TokenKind::FunctionCall => true,
            TokenKind::OpeningTag | TokenKind::SelfClosingTag => tag_parts(&token.value)
                .is_some_and(|(name, _)| {
                    self.session
                        .components
                        .lookup(scopes.components, name)
                        .is_some()
                }),
            _ => false,
        }
    }

    fn component(&self, name: &str) -> Option<ComponentId> {
        self.session
            .components
            .lookup(self.scopes.components, name)
            .copied()
    }

    // =========================================================================
    // Token navigation helpers
    // =========================================================================

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn skip_escapes(&mut self) {
        while self.at(TokenKind::Escape) {
            self.advance();
        }
    }

    /// Skip whitespace, then take a token of `kind`.
    fn expect(
        &mut self,
        kind: TokenKind,
        message: &str,
        expected: &str,
    ) -> Result<Token, ParseError> {
        self.skip_escapes();
        match self.peek() {
            Some(token) if token.kind == kind => {
                let token = token.clone();
                self.advance();
                Ok(token)
            }
            Some(token) => Err(unexpected(message, expected, token)),
            None => Err(self.unexpected_end(message, expected)),
        }
    }

    fn unexpected_end(&self, message: &str, expected: &str) -> ParseError {
        let location = self.tokens.last().map_or_else(
            || Location::new(self.file_path.as_str(), 1, 1),
            Token::location,
        );
        ParseError::syntax(message, expected, "end of input", location)
    }
}

impl Environment for Parser<'_, '_> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.parameters.get(name).cloned()
    }

    fn parameter(&self, path: &str) -> Option<Value> {
        self.resolve_parameter_path(path)
    }

    fn function(&self, name: &str) -> Option<Rc<Function>> {
        self.session.function(self.scopes.functions, name)
    }
}

fn unexpected(message: &str, expected: &str, token: &Token) -> ParseError {
    ParseError::syntax(message, expected, token.value.as_str(), token.location())
}

fn eval_error(error: EvalError, token: &Token) -> ParseError {
    match error {
        EvalError::NotAFunction(_) | EvalError::CallDepth => {
            ParseError::runtime(error.to_string(), token.location())
        }
        other => ParseError::template(other.to_string(), token),
    }
}

/// Name and raw attribute text of an opening or self-closing tag.
fn tag_parts(tag: &str) -> Option<(&str, &str)> {
    let captures = OPENING_TAG.captures(tag)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

fn closing_name(tag: &str) -> Option<&str> {
    Some(CLOSING_TAG.captures(tag)?.get(1)?.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryResolver;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render_with(
        resolver: &MemoryResolver,
        source: &str,
        params: Value,
    ) -> Result<String, ParseError> {
        let tokens = Scanner::tokenize(source, "page.zare")?;
        let mut session = Session::new(resolver).with_max_depth(12);
        let params = params.as_object().cloned().unwrap_or_default();
        Parser::new(&mut session, tokens, params, "page.zare").render()
    }

    fn render(source: &str, params: Value) -> String {
        render_with(&MemoryResolver::new(), source, params).unwrap()
    }

    fn render_err(source: &str, params: Value) -> ParseError {
        render_with(&MemoryResolver::new(), source, params).unwrap_err()
    }

    fn components() -> MemoryResolver {
        MemoryResolver::with_components([
            ("card", "serve (<div class=\"card\">@(title): @(slot)</div>)"),
            ("badge", "serve (<i>[@(slot)]</i>)"),
            ("profile", "serve (<p>@(user.name)</p>)"),
            ("loop", "as Loop import \"./loop\"\nserve (<Loop/>)"),
            (
                "styled",
                "link \"/css/card\"\nimport \"/js/card\"\nserve (<span>styled</span>)",
            ),
        ])
    }

    // =========================================================================
    // Body basics
    // =========================================================================

    #[test]
    fn test_parameter_substitution() {
        assert_eq!(render("serve (<p>@(name)</p>)", json!({ "name": "Ada" })), "<p>Ada</p>");
    }

    #[test]
    fn test_unknown_tags_pass_through() {
        assert_eq!(
            render("serve (<my-element></my-element>)", json!({})),
            "<my-element></my-element>"
        );
    }

    #[test]
    fn test_void_elements_need_no_closing_tag() {
        assert_eq!(
            render("serve (<p>a<br>b<img src=\"x.png\"></p>)", json!({})),
            "<p>a<br>b<img src=\"x.png\"></p>"
        );
    }

    #[test]
    fn test_parens_in_text() {
        assert_eq!(render("serve (<p>(a) b)</p>)", json!({})), "<p>(a) b)</p>");
        assert_eq!(render("serve (<p>:(</p>)", json!({})), "<p>:(</p>");
    }

    #[test]
    fn test_style_is_verbatim() {
        assert_eq!(
            render(
                "serve (<style>.a::after{content:\"@(x)\"}</style><p>@(x)</p>)",
                json!({ "x": 1 })
            ),
            "<style>.a::after{content:\"@(x)\"}</style><p>1</p>"
        );
    }

    #[test]
    fn test_setup_requires_keyword() {
        let err = render_err("hello serve ()", json!({}));
        assert!(matches!(err, ParseError::Syntax { ref message, .. } if message == "Expected a keyword"));
    }

    #[test]
    fn test_idempotent() {
        let source = "serve (@each (xs:x) {<b>@(x)</b>})";
        let params = json!({ "xs": [1, 2] });
        assert_eq!(render(source, params.clone()), render(source, params));
    }

    // =========================================================================
    // Tag balance
    // =========================================================================

    #[test]
    fn test_mismatched_closing_tag() {
        let err = render_err("serve (<div></span>)", json!({}));
        assert!(err.to_string().starts_with("Template Error: at file:///page.zare:1:"));
        assert!(err
            .to_string()
            .ends_with("expecting the closing tag for <div> but got </span>"));
    }

    #[test]
    fn test_unwanted_closing_tag() {
        let err = render_err("serve (</p>)", json!({}));
        assert!(err.to_string().ends_with("Unwanted tag </p>"));
    }

    #[test]
    fn test_unclosed_tag() {
        let err = render_err("serve (<div>)", json!({}));
        assert!(err.to_string().ends_with("Unclosed tag <div>"));
    }

    // =========================================================================
    // Conditionals
    // =========================================================================

    #[test]
    fn test_if_true_and_false() {
        assert_eq!(render("serve (@if (1+1==2) {fake_value})", json!({})), "fake_value");
        assert_eq!(render("serve (@if (1+1!=2) {fake_value})", json!({})), "");
    }

    #[test]
    fn test_if_else_runs_exactly_one() {
        let source = "serve (@if (n > 1) {A} @else {B})";
        assert_eq!(render(source, json!({ "n": 2 })), "A");
        assert_eq!(render(source, json!({ "n": 0 })), "B");
    }

    #[test]
    fn test_whitespace_after_lone_if() {
        assert_eq!(render("serve (@if (true) {A} x)", json!({})), "A x");
    }

    #[test]
    fn test_condition_with_parameters_and_calls() {
        let source = "fn big(x) { return x > 10 }\nserve (@if (@big(n) && user.admin) {yes} @else {no})";
        assert_eq!(render(source, json!({ "n": 20, "user": { "admin": true } })), "yes");
        assert_eq!(render(source, json!({ "n": 5, "user": { "admin": true } })), "no");
    }

    #[test]
    fn test_branch_sees_functions() {
        assert_eq!(
            render("fn double(x) { return x * 2 }\nserve (@if (true) {@double(4)})", json!({})),
            "8"
        );
    }

    #[test]
    fn test_stray_else() {
        let err = render_err("serve (@else {x})", json!({}));
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    // =========================================================================
    // Loops
    // =========================================================================

    #[test]
    fn test_each_binding_and_index() {
        let params = json!({ "arr": ["v1", "v2", "v3"] });
        assert_eq!(render("serve (@each (arr:a) {@(a)})", params.clone()), "v1v2v3");
        assert_eq!(render("serve (@each (arr:a) {@(_i)})", params), "012");
    }

    #[test]
    fn test_each_with_control_flow_renders_per_item() {
        assert_eq!(
            render(
                "serve (@each (n:x) {@if (x > 1) {@(x)}})",
                json!({ "n": [1, 2, 3] })
            ),
            "23"
        );
    }

    #[test]
    fn test_each_nested_path() {
        assert_eq!(
            render(
                "serve (@each (user.items:item) {<li>@(item.name)</li>})",
                json!({ "user": { "items": [{ "name": "a" }, { "name": "b" }] } })
            ),
            "<li>a</li><li>b</li>"
        );
    }

    #[test]
    fn test_each_requires_array() {
        let err = render_err("serve (@each (n:x) {@(x)})", json!({ "n": 3 }));
        assert!(matches!(err, ParseError::Runtime { ref message, .. } if message == "expecting an array, got number"));
        let err = render_err("serve (@each (missing:x) {@(x)})", json!({}));
        assert!(err.to_string().ends_with("expecting an array, got undefined"));
    }

    #[test]
    fn test_each_reserved_binding() {
        let err = render_err("serve (@each (arr:_i) {x})", json!({ "arr": [1] }));
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    // =========================================================================
    // Functions and modules
    // =========================================================================

    #[test]
    fn test_declared_and_module_functions() {
        assert_eq!(
            render(
                "fn sum(a, b) { return Number(a) + Number(b) }\nuse math\nserve (@pow(sum(2, 3), 2))",
                json!({})
            ),
            "25"
        );
    }

    #[test]
    fn test_module_functions() {
        assert_eq!(render("use string\nserve (@upper(\"hello\"))", json!({})), "HELLO");
        assert_eq!(render("use math\nserve (@PI())", json!({})), "3.141592653589793");
        assert_eq!(render("use number\nserve (@toFixed(\"2.54\", 0))", json!({})), "3");
    }

    #[test]
    fn test_oversized_repeat_is_an_error() {
        let err = render_err("use string\nserve (@repeat(\"ab\", 1e19))", json!({}));
        assert!(matches!(err, ParseError::Template { .. }));
        assert!(err.to_string().ends_with("Invalid string length"));

        let source = "fn wide(s) { return s.repeat(1e19) }\nserve (@wide(\"ab\"))";
        assert!(render_err(source, json!({})).to_string().ends_with("Invalid string length"));
    }

    #[test]
    fn test_unknown_function() {
        let err = render_err("serve (@nope(1))", json!({}));
        assert!(matches!(err, ParseError::Runtime { ref message, .. } if message == "`nope` is not a function"));
    }

    #[test]
    fn test_keyword_function_name() {
        let err = render_err("fn if(a) { return a }\nserve ()", json!({}));
        assert!(err.to_string().ends_with("Can not assign keywords as identifiers"));
    }

    #[test]
    fn test_function_requires_body() {
        let err = render_err("fn f(a)\nserve ()", json!({}));
        assert!(matches!(err, ParseError::Syntax { ref expected, .. } if expected == "'{'"));
    }

    #[test]
    fn test_unknown_module() {
        let err = render_err("use regex\nserve ()", json!({}));
        assert!(matches!(err, ParseError::Template { .. }));
    }

    // =========================================================================
    // Components
    // =========================================================================

    #[test]
    fn test_component_with_slot() {
        let html = render_with(
            &components(),
            "as Card import \"./card\"\nserve (<Card title=\"Hi\"><b>@(name)</b></Card>)",
            json!({ "name": "Ada" }),
        )
        .unwrap();
        assert_eq!(html, "<div class=\"card\">Hi: <b>Ada</b></div>");
    }

    #[test]
    fn test_self_closing_component_has_no_slot() {
        let html = render_with(
            &components(),
            "as Badge import \"./badge\"\nserve (<Badge/>)",
            json!({}),
        )
        .unwrap();
        assert_eq!(html, "<i>[]</i>");
    }

    #[test]
    fn test_caller_parameters_shadow_attributes() {
        let html = render_with(
            &components(),
            "as Card import \"./card\"\nserve (<Card title=\"attr\">x</Card>)",
            json!({ "title": "param" }),
        )
        .unwrap();
        assert_eq!(html, "<div class=\"card\">param: x</div>");
    }

    #[test]
    fn test_unquoted_attribute_reference() {
        let html = render_with(
            &components(),
            "as Profile import \":profile\"\nserve (<Profile user=@(user)/>)",
            json!({ "user": { "name": "Ada" } }),
        )
        .unwrap();
        assert_eq!(html, "<p>Ada</p>");
    }

    #[test]
    fn test_nested_same_name_in_slot() {
        let html = render_with(
            &components(),
            "as Badge import \"./badge\"\nserve (<Badge><Badge>x</Badge></Badge>)",
            json!({}),
        )
        .unwrap();
        assert_eq!(html, "<i>[<i>[x]</i>]</i>");
    }

    #[test]
    fn test_component_in_loop() {
        let html = render_with(
            &components(),
            "as Badge import \"./badge\"\nserve (@each (xs:x) {<Badge>@(x)</Badge>})",
            json!({ "xs": ["a", "b"] }),
        )
        .unwrap();
        assert_eq!(html, "<i>[a]</i><i>[b]</i>");
    }

    #[test]
    fn test_unended_component() {
        let err = render_with(
            &components(),
            "as Card import \"./card\"\nserve (<Card>x)",
            json!({}),
        )
        .unwrap_err();
        assert!(err.to_string().ends_with("Unended component <Card>"));
    }

    #[test]
    fn test_missing_component() {
        let err = render_err("as Nope import \"./nope\"\nserve ()", json!({}));
        assert!(err.to_string().ends_with("Component `./nope` not found"));
    }

    #[test]
    fn test_cyclic_import_hits_depth_limit() {
        let err = render_with(
            &components(),
            "as Loop import \"./loop\"\nserve (<Loop/>)",
            json!({}),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Runtime { ref message, .. } if message == "Maximum render depth of 12 exceeded"));
    }

    #[test]
    fn test_quoted_attribute_resolved_by_caller() {
        let html = render_with(
            &components(),
            "as Card import \"./card\"\nserve (<Card title=\"Hi @(name)\">x</Card>)",
            json!({ "name": "Ada" }),
        )
        .unwrap();
        assert_eq!(html, "<div class=\"card\">Hi Ada: x</div>");
    }

    // =========================================================================
    // Inserted values are substituted once
    // =========================================================================

    fn hostile() -> Value {
        json!({ "x": "@(secret)", "xs": ["@(secret)"], "secret": "leaked" })
    }

    #[test]
    fn test_value_in_slot_is_not_resolved_again() {
        let html = render_with(
            &components(),
            "as Badge import \"./badge\"\nserve (<Badge><b>@(x)</b></Badge>)",
            hostile(),
        )
        .unwrap();
        assert_eq!(html, "<i>[<b>@(secret)</b>]</i>");
    }

    #[test]
    fn test_value_in_loop_is_not_resolved_again() {
        assert_eq!(
            render("serve (@each (xs:x) {<p>@(x)</p>})", hostile()),
            "<p>@(secret)</p>"
        );
        assert_eq!(
            render(
                "serve (@each (xs:x) {@if (true) {<p>@(x)</p>}})",
                hostile()
            ),
            "<p>@(secret)</p>"
        );
    }

    #[test]
    fn test_value_in_component_is_not_resolved_again() {
        let html = render_with(
            &components(),
            "as Profile import \":profile\"\nserve (<Profile user=@(user)/>)",
            json!({ "user": { "name": "@(secret)" }, "secret": "leaked" }),
        )
        .unwrap();
        assert_eq!(html, "<p>@(secret)</p>");

        let html = render_with(
            &components(),
            "as Card import \"./card\"\nserve (<Card title=\"@(x)\">y</Card>)",
            hostile(),
        )
        .unwrap();
        assert_eq!(html, "<div class=\"card\">@(secret): y</div>");
    }

    #[test]
    fn test_function_result_is_not_resolved_again() {
        assert_eq!(
            render("use string\nserve (<p>@trim(x)</p>)", hostile()),
            "<p>@(secret)</p>"
        );
    }

    // =========================================================================
    // Static assets
    // =========================================================================

    #[test]
    fn test_links_injected_after_title() {
        let html = render(
            "link \"./css/main\"\nimport \"/js/app.js\"\nserve (<html><head><title>T</title></head></html>)",
            json!({}),
        );
        assert_eq!(
            html,
            "<html><head><title>T</title>\n<link rel=\"stylesheet\" href=\"./css/main.css\" />\n<script src=\"/js/app.js\" defer></script></head></html>"
        );
    }

    #[test]
    fn test_component_assets_reach_the_page() {
        let html = render_with(
            &components(),
            "as Styled import \"./styled\"\nserve (<head></head><Styled/>)",
            json!({}),
        )
        .unwrap();
        assert_eq!(
            html,
            "<head>\n<link rel=\"stylesheet\" href=\"/css/card.css\" />\n<script src=\"/js/card.js\" defer></script></head><span>styled</span>"
        );
    }

    #[test]
    fn test_links_need_head() {
        let err = render_err("link \"/a.css\"\nserve (<p>x</p>)", json!({}));
        assert!(matches!(err, ParseError::Runtime { ref message, .. } if message == "Head tag is required to link stylesheets"));
    }

    #[test]
    fn test_link_path_shape() {
        let err = render_err("link \"virtual://dummy\"\nserve ()", json!({}));
        assert!(matches!(err, ParseError::Template { .. }));
    }
}
