//! Token kinds for the surface language.

use crate::span::Span;

/// Which channel a token belongs to.
///
/// Hidden tokens (whitespace runs that contain a newline, and comments) are
/// still produced by the lexer but are invisible to ordinary parsing; the
/// parser only reaches for them when a predicate needs lookbehind (see
/// `parser::Parser::newline_precedes`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Default,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Keyword {
    Classe,
    Herda,
    Func,
    Varfunc,
    Const,
    Varconst,
    Refvar,
    Se,
    Senao,
    Fimse,
    Enquanto,
    Efim,
    Epara,
    Para,
    Cada,
    Em,
    Casovar,
    Casose,
    Casofim,
    Ret,
    Sair,
    Continuar,
    Terminar,
    Novo,
    Apagar,
    Nulo,
    Este,
    Arg,
    Args,
    Comum,
    Sav,
    Incluir,
    Exec,
    Telatxt,
    Log,
    Err,
    Completo,
    Arqexec,
}

impl Keyword {
    /// All keywords that may still be consumed as plain identifiers in a
    /// name position.
    pub fn admissible_as_identifier(self) -> bool {
        matches!(
            self,
            Keyword::Classe
                | Keyword::Sav
                | Keyword::Novo
                | Keyword::Arg
                | Keyword::Comum
                | Keyword::Para
        ) || self.is_type_name_keyword()
    }

    /// After a member-access dot, a superset of keywords is admitted as a
    /// member name (e.g. `obj.func`, `obj.const`).
    pub fn admissible_as_member_name(self) -> bool {
        self.admissible_as_identifier() || matches!(self, Keyword::Func | Keyword::Const)
    }

    fn is_type_name_keyword(self) -> bool {
        // Type names used as function identifiers are handled by the lexer
        // classifying them as plain Ident tokens in the first place (see
        // `Lexer::classify_word`); Keyword never carries a type name.
        false
    }

    pub fn from_word(word: &str) -> Option<Keyword> {
        Some(match word {
            "classe" => Keyword::Classe,
            "herda" => Keyword::Herda,
            "func" => Keyword::Func,
            "varfunc" => Keyword::Varfunc,
            "const" => Keyword::Const,
            "varconst" => Keyword::Varconst,
            "refvar" => Keyword::Refvar,
            "se" => Keyword::Se,
            "senao" => Keyword::Senao,
            "fimse" => Keyword::Fimse,
            "enquanto" => Keyword::Enquanto,
            "efim" => Keyword::Efim,
            "epara" => Keyword::Epara,
            "para" => Keyword::Para,
            "cada" => Keyword::Cada,
            "em" => Keyword::Em,
            "casovar" => Keyword::Casovar,
            "casose" => Keyword::Casose,
            "casofim" => Keyword::Casofim,
            "ret" => Keyword::Ret,
            "sair" => Keyword::Sair,
            "continuar" => Keyword::Continuar,
            "terminar" => Keyword::Terminar,
            "novo" => Keyword::Novo,
            "apagar" => Keyword::Apagar,
            "nulo" => Keyword::Nulo,
            "este" => Keyword::Este,
            "arg" => Keyword::Arg,
            "args" => Keyword::Args,
            "comum" => Keyword::Comum,
            "sav" => Keyword::Sav,
            "incluir" => Keyword::Incluir,
            "exec" => Keyword::Exec,
            "telatxt" => Keyword::Telatxt,
            "log" => Keyword::Log,
            "err" => Keyword::Err,
            "completo" => Keyword::Completo,
            "arqexec" => Keyword::Arqexec,
            _ => return None,
        })
    }
}

/// Primitive type names, recognized as a distinct token kind so the parser
/// can use them both as type annotations and (per the context-sensitive
/// rules) as ordinary function identifiers.
pub const PRIMITIVE_TYPE_NAMES: &[&str] = &[
    "int1", "int8", "uint8", "int16", "uint16", "int32", "uint32", "real", "real2", "ref", "txt1",
    "txt2", "nomeobj", "listaobj", "listaitem", "textotxt", "textopos", "textovar", "textoobj",
    "arqdir", "arqlog", "arqprog", "arqexec", "arqsav", "arqtxt", "arqmem", "inttempo", "intexec",
    "intinc", "intdec", "indiceobj", "indiceitem", "socket", "serv", "prog", "debug", "datahora",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Lt,
    Gt,
    Eq,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    LtEq,
    GtEq,
    Shl,
    Shr,
    PlusPlus,
    MinusMinus,
    AmpAmp,
    PipePipe,
    QuestionQuestion,
    Question,
    Colon,
    QuestionColon,
    At,
    Dollar,
    Dot,
    Comma,
    Semicolon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    TypeName(String),
    Keyword(Keyword),
    Int(i64),
    Double(f64),
    Str(String),
    Op(Operator),
    Newline,
    Comment(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
    pub channel: Channel,
}

impl Token {
    pub fn is_ident_like(&self) -> bool {
        matches!(self.kind, TokenKind::Ident(_) | TokenKind::TypeName(_))
    }

    /// Name text for any token that can appear in a name position, honoring
    /// the context-sensitive keyword-as-identifier rules.
    pub fn name_text(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) | TokenKind::TypeName(s) => Some(s),
            _ => None,
        }
    }
}
