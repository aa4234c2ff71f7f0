use core::{cell::RefCell, fmt::{self, Write}};
use std::rc::Rc;

use itertools::Itertools;

use crate::value::{Function, Value};


/// Renders `value` as text. With `readable` set, strings are quoted and
/// escaped so that reading the output gives back an equal value; without
/// it their contents are written raw.
pub fn print(value: &Value, readable: bool) -> String {
    let mut output = String::new();
    // Writing into a String cannot fail
    let _ = write_value(&mut output, value, readable, &mut vec![]);
    output
}

// Atoms currently being written, innermost last. An atom can end up
// holding itself, so meeting one of these again means a cycle.
type OpenAtoms = Vec<*const RefCell<Value>>;

fn write_sequence<'v>(output: &mut String, values: impl Iterator<Item = &'v Value>, readable: bool, open: &mut OpenAtoms) -> fmt::Result {
    for (index, value) in values.enumerate() {
        if index > 0 { output.push(' '); }
        write_value(output, value, readable, open)?;
    }
    Ok(())
}

fn write_escaped(output: &mut String, text: &str) -> fmt::Result {
    output.push('"');
    for c in text.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\t' => output.push_str("\\t"),
            '\r' => output.push_str("\\r"),
            c if c.is_ascii_control() || !c.is_ascii() => write!(output, "\\x{:x};", c as u32)?,
            c => output.push(c),
        }
    }
    output.push('"');
    Ok(())
}

fn write_value(output: &mut String, value: &Value, readable: bool, open: &mut OpenAtoms) -> fmt::Result {
    match value {
        Value::Nil => output.push_str("nil"),
        Value::Bool(value) => write!(output, "{}", value)?,
        Value::Number(value) => write!(output, "{}", value)?,
        Value::Symbol(name) => output.push_str(name),
        Value::Keyword(name) => write!(output, ":{}", name)?,
        Value::String(text) if readable => write_escaped(output, text)?,
        Value::String(text) => output.push_str(text),
        Value::List(values) => {
            output.push('(');
            write_sequence(output, values.iter(), readable, open)?;
            output.push(')');
        }
        Value::Vector(values) => {
            output.push('[');
            write_sequence(output, values.iter(), readable, open)?;
            output.push(']');
        }
        Value::HashMap(entries) => {
            output.push('{');
            let entries = entries.iter()
                .sorted_by(|(a, _), (b, _)| a.cmp(b))
                .map(|(key, value)| (key.to_value(), value));
            for (index, (key, value)) in entries.enumerate() {
                if index > 0 { output.push(' '); }
                write_value(output, &key, readable, open)?;
                output.push(' ');
                write_value(output, value, readable, open)?;
            }
            output.push('}');
        }
        Value::Function(function) => match &**function {
            Function::Builtin(builtin) => write!(output, "#<builtin {}>", builtin.name)?,
            Function::Closure(_) => output.push_str("#<function>"),
        },
        Value::Atom(cell) if open.contains(&Rc::as_ptr(cell)) => output.push_str("(atom ...)"),
        Value::Atom(cell) => {
            open.push(Rc::as_ptr(cell));
            output.push_str("(atom ");
            let result = write_value(output, &cell.borrow(), readable, open);
            open.pop();
            result?;
            output.push(')');
        }
    }
    Ok(())
}

/// Joins already evaluated values the way `pr-str`, `str`, `prn` and
/// `println` need them.
pub(crate) fn print_all(values: &[Value], readable: bool, separator: &str) -> String {
    values.iter().map(|value| print(value, readable)).join(separator)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::{parser::parse, value::HashKey};

    use super::*;

    #[test]
    fn prints_scalars() {
        assert_eq!(print(&Value::Nil, true), "nil");
        assert_eq!(print(&Value::Bool(false), true), "false");
        assert_eq!(print(&Value::Number(-12), true), "-12");
        assert_eq!(print(&Value::keyword("k"), true), ":k");
        assert_eq!(print(&Value::symbol("abc"), true), "abc");
    }

    #[test]
    fn readable_strings_are_escaped() {
        let value = Value::string("a \"quoted\"\nline\\é");
        assert_eq!(print(&value, true), r#""a \"quoted\"\nline\\\xe9;""#);
        assert_eq!(print(&value, false), "a \"quoted\"\nline\\é");
    }

    #[test]
    fn round_trips_through_the_reader() -> anyhow::Result<()> {
        for source in [r#"(1 "two\n" :three [4 nil true] {"k" (sym)})"#, r#""tab\there \x1;""#, "()", "[]", "{}"] {
            let value = parse(source)?;
            assert_eq!(parse(&print(&value, true))?, value, "{} did not round-trip", source);
        }
        Ok(())
    }

    #[test]
    fn hash_maps_print_in_key_order() {
        let map = Value::hash_map(HashMap::from([
            (HashKey::Keyword("b".into()), Value::Number(2)),
            (HashKey::Keyword("a".into()), Value::Number(1)),
            (HashKey::String("z".into()), Value::Nil),
        ]));
        assert_eq!(print(&map, true), r#"{"z" nil :a 1 :b 2}"#);
    }

    #[test]
    fn atoms_print_their_contents() {
        let atom = Value::atom(Value::list(vec![Value::Number(1)]));
        assert_eq!(print(&atom, true), "(atom (1))");
    }

    #[test]
    fn self_referencing_atoms_print_a_placeholder() {
        let atom = Value::atom(Value::Nil);
        let Value::Atom(cell) = &atom else { unreachable!() };

        cell.replace(atom.clone());
        assert_eq!(print(&atom, true), "(atom (atom ...))");

        cell.replace(Value::vector(vec![Value::Number(1), atom.clone()]));
        assert_eq!(print(&atom, true), "(atom [1 (atom ...)])");

        // Break the cycle so the cell is freed
        cell.replace(Value::Nil);
    }

    #[test]
    fn shared_atoms_that_are_not_cycles_print_in_full() {
        let shared = Value::atom(Value::Number(1));
        let pair = Value::list(vec![shared.clone(), shared]);
        assert_eq!(print(&pair, true), "((atom 1) (atom 1))");
    }

    #[test]
    fn print_all_joins_with_separator() {
        let values = [Value::string("a"), Value::Number(1)];
        assert_eq!(print_all(&values, true, " "), r#""a" 1"#);
        assert_eq!(print_all(&values, false, ""), "a1");
    }
}
