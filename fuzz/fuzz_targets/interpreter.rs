#![no_main]

use core::fmt;

use itertools::Itertools;
use libfuzzer_sys::{arbitrary::Arbitrary, fuzz_target};

// Builtins and variable loads
#[derive(Arbitrary, Debug)]
enum MalAtom {
    Add, Sub, Mul, Div,
    True, False, Nil,
    Greater, GreaterEq,
    Less, LessEq, Eq,

    List, Count, First, Rest, Nth,
    Cons, Concat, Vec, Map, Apply,
    HashMap, Get, Assoc,
    Atom, Deref, Reset, Swap,
    PrStr, Str, ReadString, Eval,

    Identifier(String),
    Keyword(String),
    Text(String),
    Number(i64),
}

impl fmt::Display for MalAtom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", match self {
            MalAtom::Add => "+",
            MalAtom::Sub => "-",
            MalAtom::Mul => "*",
            MalAtom::Div => "/",
            MalAtom::True => "true",
            MalAtom::False => "false",
            MalAtom::Nil => "nil",
            MalAtom::Greater => ">",
            MalAtom::GreaterEq => ">=",
            MalAtom::Less => "<",
            MalAtom::LessEq => "<=",
            MalAtom::Eq => "=",
            MalAtom::List => "list",
            MalAtom::Count => "count",
            MalAtom::First => "first",
            MalAtom::Rest => "rest",
            MalAtom::Nth => "nth",
            MalAtom::Cons => "cons",
            MalAtom::Concat => "concat",
            MalAtom::Vec => "vec",
            MalAtom::Map => "map",
            MalAtom::Apply => "apply",
            MalAtom::HashMap => "hash-map",
            MalAtom::Get => "get",
            MalAtom::Assoc => "assoc",
            MalAtom::Atom => "atom",
            MalAtom::Deref => "deref",
            MalAtom::Reset => "reset!",
            MalAtom::Swap => "swap!",
            MalAtom::PrStr => "pr-str",
            MalAtom::Str => "str",
            MalAtom::ReadString => "read-string",
            MalAtom::Eval => "eval",
            MalAtom::Identifier(identifier) => identifier,
            MalAtom::Keyword(name) => return write!(f, ":{}", name),
            MalAtom::Text(text) => return write!(f, "{:?}", text),
            MalAtom::Number(value) => return write!(f, "{}", value),
        })
    }
}

#[derive(Arbitrary, Debug)]
enum MalCommand {
    Lambda(Vec<MalCommand>),
    Define(Vec<MalCommand>),
    Let(Vec<MalCommand>),
    If(Vec<MalCommand>),
    Do(Vec<MalCommand>),
    Quote(Vec<MalCommand>),
    Quasiquote(Vec<MalCommand>),
    Unquote(Vec<MalCommand>),
    SpliceUnquote(Vec<MalCommand>),
    Call(Vec<MalCommand>),
    Vector(Vec<MalCommand>),

    Atom(MalAtom),
}

fn stringify_arguments(values: &[MalCommand]) -> String {
    values.iter()
        .map(MalCommand::to_string)
        .join(" ")
}

impl fmt::Display for MalCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (head, args) = match self {
            MalCommand::Atom(atom) => return atom.fmt(f),
            MalCommand::Vector(args) => return write!(f, "[{}]", stringify_arguments(args)),
            MalCommand::Call(args) => return write!(f, "({})", stringify_arguments(args)),
            MalCommand::Lambda(args) => ("fn*", args),
            MalCommand::Define(args) => ("def!", args),
            MalCommand::Let(args) => ("let*", args),
            MalCommand::If(args) => ("if", args),
            MalCommand::Do(args) => ("do", args),
            MalCommand::Quote(args) => ("quote", args),
            MalCommand::Quasiquote(args) => ("quasiquote", args),
            MalCommand::Unquote(args) => ("unquote", args),
            MalCommand::SpliceUnquote(args) => ("splice-unquote", args),
        };

        write!(f, "({} {})", head, stringify_arguments(args))
    }
}

fuzz_target!(|commands: Vec<MalCommand>| {
    let Ok(context) = mallet::EvaluationContext::with_output(std::io::sink()) else {
        return;
    };

    for command in commands {
        let _ = context.evaluate_str(&command.to_string());
    }
});
