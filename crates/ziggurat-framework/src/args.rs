//! Command-argument grammar and binder.
//!
//! The raw text after a command keyword is tokenized left-to-right into
//! three token kinds, matched greedily in priority order:
//!
//! 1. a **quoted literal** - begins and ends with an unescaped `"`, may
//!    contain escaped quotes and the usual escape sequences (`\n`, `\t`,
//!    `\\`), which are resolved to their literal characters;
//! 2. a **named flag** - a single dash followed by a non-space run; if the
//!    next token is a value token it becomes the flag's value, otherwise
//!    the flag binds as boolean true;
//! 3. a **bare word** - any other non-space run.
//!
//! Binding walks the handler's declared [`Signature`] in order, collecting
//! *all* missing parameter names before failing, then casts every bound
//! value to its declared [`ArgType`].
//!
//! Flags carrying the `_` marker are administrative: they are stripped
//! before ordinary binding and honoured only for Admin callers (`_ch`
//! swaps the reply channel for the invocation, `_mute` discards outbound
//! sends).

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use ziggurat_core::error::ParseFailure;
use ziggurat_core::Context;

/// Marker prefix for reserved administrative flags.
const ADMIN_MARKER: char = '_';

// =============================================================================
// Tokenizer
// =============================================================================

/// One lexed token of the raw argument string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A quoted literal with escapes already resolved.
    Quoted(String),
    /// A named flag, dash stripped.
    Flag(String),
    /// A bare word.
    Bare(String),
}

/// Tokenizes a raw argument string. Never fails: a lone `"` that is never
/// closed simply starts a bare word.
pub fn tokenize(raw: &str) -> Vec<Token> {
    let chars: Vec<char> = raw.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' {
            if let Some((literal, next)) = scan_quoted(&chars, i) {
                tokens.push(Token::Quoted(literal));
                i = next;
                continue;
            }
        }
        if c == '-'
            && chars
                .get(i + 1)
                .is_some_and(|c| c.is_ascii_alphabetic() || *c == ADMIN_MARKER)
        {
            let (word, next) = scan_bare(&chars, i + 1);
            tokens.push(Token::Flag(word));
            i = next;
            continue;
        }
        let (word, next) = scan_bare(&chars, i);
        tokens.push(Token::Bare(word));
        i = next;
    }

    tokens
}

fn scan_quoted(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut buf = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                buf.push(unescape(chars[i + 1]));
                i += 2;
            }
            '"' => return Some((buf, i + 1)),
            c => {
                buf.push(c);
                i += 1;
            }
        }
    }
    None
}

fn scan_bare(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    let mut buf = String::new();
    while i < chars.len() && !chars[i].is_whitespace() {
        buf.push(chars[i]);
        i += 1;
    }
    (buf, i)
}

/// Resolves one escape sequence; unknown escapes yield the character
/// itself.
fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

// =============================================================================
// Signatures
// =============================================================================

/// Semantic type a bound value is cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Identity: the value stays a string.
    Str,
    Int,
    Float,
    Bool,
    /// A string restricted to a fixed set of options.
    Choice(&'static [&'static str]),
}

impl ArgType {
    fn expected(&self) -> String {
        match self {
            ArgType::Str => "a string".to_string(),
            ArgType::Int => "an integer".to_string(),
            ArgType::Float => "a number".to_string(),
            ArgType::Bool => "a boolean".to_string(),
            ArgType::Choice(options) => format!("one of {}", options.join("|")),
        }
    }
}

/// A bound, typed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::Str(s) => f.write_str(s),
            ArgValue::Int(i) => write!(f, "{i}"),
            ArgValue::Float(x) => write!(f, "{x}"),
            ArgValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone)]
enum ParamKind {
    /// Positional, must be supplied.
    Required,
    /// Positional, may be absent; binds the default if one is declared.
    Optional(Option<ArgValue>),
    /// Variadic positional: consumes every remaining positional token.
    Rest,
    /// Keyword, filled from a flag of the same name; missing without a
    /// default is an error.
    Flag(Option<ArgValue>),
    /// Variadic keyword: absorbs all remaining flags verbatim.
    FlagRest,
}

#[derive(Debug, Clone)]
struct Param {
    name: &'static str,
    ty: ArgType,
    kind: ParamKind,
}

/// The declared parameter list of a command callback.
///
/// Built explicitly at handler construction - there is no reflection on
/// the callback itself.
///
/// ```rust,ignore
/// let sig = Signature::new()
///     .required("profile", ArgType::Str)
///     .flag("count", ArgType::Int, Some(ArgValue::Int(10)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// A required positional parameter.
    pub fn required(mut self, name: &'static str, ty: ArgType) -> Self {
        self.params.push(Param {
            name,
            ty,
            kind: ParamKind::Required,
        });
        self
    }

    /// An optional positional parameter.
    pub fn optional(
        mut self,
        name: &'static str,
        ty: ArgType,
        default: Option<ArgValue>,
    ) -> Self {
        self.params.push(Param {
            name,
            ty,
            kind: ParamKind::Optional(default),
        });
        self
    }

    /// A variadic positional parameter consuming everything left over.
    pub fn rest(mut self, name: &'static str, ty: ArgType) -> Self {
        self.params.push(Param {
            name,
            ty,
            kind: ParamKind::Rest,
        });
        self
    }

    /// A keyword parameter filled from a `-name` flag.
    pub fn flag(
        mut self,
        name: &'static str,
        ty: ArgType,
        default: Option<ArgValue>,
    ) -> Self {
        self.params.push(Param {
            name,
            ty,
            kind: ParamKind::Flag(default),
        });
        self
    }

    /// A variadic keyword parameter absorbing all remaining flags.
    pub fn flag_rest(mut self, name: &'static str) -> Self {
        self.params.push(Param {
            name,
            ty: ArgType::Str,
            kind: ParamKind::FlagRest,
        });
        self
    }
}

// =============================================================================
// Bound arguments
// =============================================================================

/// Raised when a callback reads a bound value under a name or type its
/// declared signature never bound. This is an author contract violation
/// and surfaces as a malformed outcome, not a user error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ArgMismatch {
    #[error("argument '{0}' was never bound")]
    Unbound(String),
    #[error("argument '{name}' is not {wanted}")]
    Kind { name: String, wanted: &'static str },
}

/// The values produced by a successful bind, keyed by declared name.
#[derive(Debug, Clone, Default)]
pub struct BoundArgs {
    values: HashMap<&'static str, ArgValue>,
    rest: Vec<ArgValue>,
    extra: HashMap<String, ArgValue>,
}

impl BoundArgs {
    /// No arguments at all, as passed to passive and scheduled triggers.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Result<&str, ArgMismatch> {
        match self.values.get(name) {
            Some(ArgValue::Str(s)) => Ok(s),
            Some(_) => Err(ArgMismatch::Kind {
                name: name.to_string(),
                wanted: "a string",
            }),
            None => Err(ArgMismatch::Unbound(name.to_string())),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, ArgMismatch> {
        match self.values.get(name) {
            Some(ArgValue::Int(i)) => Ok(*i),
            Some(_) => Err(ArgMismatch::Kind {
                name: name.to_string(),
                wanted: "an integer",
            }),
            None => Err(ArgMismatch::Unbound(name.to_string())),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, ArgMismatch> {
        match self.values.get(name) {
            Some(ArgValue::Float(x)) => Ok(*x),
            Some(ArgValue::Int(i)) => Ok(*i as f64),
            Some(_) => Err(ArgMismatch::Kind {
                name: name.to_string(),
                wanted: "a number",
            }),
            None => Err(ArgMismatch::Unbound(name.to_string())),
        }
    }

    pub fn switch(&self, name: &str) -> Result<bool, ArgMismatch> {
        match self.values.get(name) {
            Some(ArgValue::Bool(b)) => Ok(*b),
            Some(_) => Err(ArgMismatch::Kind {
                name: name.to_string(),
                wanted: "a boolean",
            }),
            None => Err(ArgMismatch::Unbound(name.to_string())),
        }
    }

    /// An optional string: unbound is `None`, a non-string is still a
    /// contract violation.
    pub fn opt_str(&self, name: &str) -> Result<Option<&str>, ArgMismatch> {
        match self.values.get(name) {
            None => Ok(None),
            Some(ArgValue::Str(s)) => Ok(Some(s)),
            Some(_) => Err(ArgMismatch::Kind {
                name: name.to_string(),
                wanted: "a string",
            }),
        }
    }

    /// Values consumed by a variadic positional parameter.
    pub fn rest(&self) -> &[ArgValue] {
        &self.rest
    }

    /// Flags absorbed verbatim by a variadic keyword parameter.
    pub fn extra(&self) -> &HashMap<String, ArgValue> {
        &self.extra
    }
}

/// Administrative directives stripped from the argument stream before
/// binding. Applied only when the caller is Admin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminDirectives {
    /// `-_ch <channel>`: swap the reply target for this invocation.
    pub redirect: Option<String>,
    /// `-_mute`: discard outbound sends without altering the outcome.
    pub mute: bool,
}

impl AdminDirectives {
    pub fn apply(&self, ctx: &Context) {
        if let Some(channel) = &self.redirect {
            ctx.redirect(channel.clone());
        }
        if self.mute {
            ctx.mute();
        }
    }
}

// =============================================================================
// Binder
// =============================================================================

/// Binds a raw argument string against a declared signature.
///
/// All missing required names are collected before failing; casts run
/// after completeness is established. Administrative flags are stripped
/// unconditionally and returned separately.
pub fn bind(
    signature: &Signature,
    raw: &str,
) -> Result<(BoundArgs, AdminDirectives), ParseFailure> {
    let tokens = tokenize(raw);

    // Pair flags with their values and separate positionals.
    let mut positionals: Vec<String> = Vec::new();
    let mut flags: Vec<(String, ArgValue)> = Vec::new();
    let mut pending: Option<usize> = None;
    for token in tokens {
        match token {
            Token::Flag(name) => {
                flags.push((name, ArgValue::Bool(true)));
                pending = Some(flags.len() - 1);
            }
            Token::Quoted(value) | Token::Bare(value) => match pending.take() {
                Some(ix) => flags[ix].1 = ArgValue::Str(value),
                None => positionals.push(value),
            },
        }
    }

    // Strip administrative flags before ordinary binding.
    let mut admin = AdminDirectives::default();
    let mut named: HashMap<String, ArgValue> = HashMap::new();
    for (name, value) in flags {
        if name.starts_with(ADMIN_MARKER) {
            match (name.as_str(), value) {
                ("_ch", ArgValue::Str(channel)) => admin.redirect = Some(channel),
                ("_mute", _) => admin.mute = true,
                (other, _) => debug!(flag = other, "unknown administrative flag"),
            }
        } else {
            named.insert(name, value);
        }
    }

    // Walk the declared parameters, batching every missing name. Casts are
    // deferred until completeness is established: a bad value must not mask
    // the full missing list.
    let mut out = BoundArgs::default();
    let mut missing: Vec<String> = Vec::new();
    let mut staged: Vec<(&Param, ArgValue)> = Vec::new();
    let mut staged_rest: Vec<(&Param, ArgValue)> = Vec::new();
    let mut pos_iter = positionals.into_iter();
    for param in &signature.params {
        match &param.kind {
            ParamKind::Required => match pos_iter.next() {
                Some(value) => staged.push((param, ArgValue::Str(value))),
                None => missing.push(param.name.to_string()),
            },
            ParamKind::Optional(default) => match pos_iter.next() {
                Some(value) => staged.push((param, ArgValue::Str(value))),
                None => {
                    if let Some(default) = default {
                        out.values.insert(param.name, default.clone());
                    }
                }
            },
            ParamKind::Rest => {
                for value in pos_iter.by_ref() {
                    staged_rest.push((param, ArgValue::Str(value)));
                }
            }
            ParamKind::Flag(default) => match named.remove(param.name) {
                Some(value) => staged.push((param, value)),
                None => match default {
                    Some(default) => {
                        out.values.insert(param.name, default.clone());
                    }
                    None => missing.push(param.name.to_string()),
                },
            },
            ParamKind::FlagRest => {
                out.extra.extend(named.drain());
            }
        }
    }

    if !missing.is_empty() {
        return Err(ParseFailure::Missing(missing));
    }

    for (param, value) in staged {
        out.values.insert(param.name, cast(param, value)?);
    }
    for (param, value) in staged_rest {
        out.rest.push(cast(param, value)?);
    }

    Ok((out, admin))
}

/// Casts a raw bound value to the parameter's declared type.
fn cast(param: &Param, value: ArgValue) -> Result<ArgValue, ParseFailure> {
    let fail = |got: String| ParseFailure::Cast {
        name: param.name.to_string(),
        expected: param.ty.expected(),
        got,
    };
    match (&value, param.ty) {
        (ArgValue::Str(s), ArgType::Str) => Ok(ArgValue::Str(s.clone())),
        (ArgValue::Str(s), ArgType::Int) => {
            s.parse::<i64>().map(ArgValue::Int).map_err(|_| fail(s.clone()))
        }
        (ArgValue::Str(s), ArgType::Float) => {
            s.parse::<f64>().map(ArgValue::Float).map_err(|_| fail(s.clone()))
        }
        (ArgValue::Str(s), ArgType::Bool) => match s.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(ArgValue::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(ArgValue::Bool(false)),
            _ => Err(fail(s.clone())),
        },
        (ArgValue::Str(s), ArgType::Choice(options)) => {
            if options.contains(&s.as_str()) {
                Ok(ArgValue::Str(s.clone()))
            } else {
                Err(fail(s.clone()))
            }
        }
        (ArgValue::Bool(b), ArgType::Bool) => Ok(ArgValue::Bool(*b)),
        (other, _) => Err(fail(other.to_string())),
    }
}
