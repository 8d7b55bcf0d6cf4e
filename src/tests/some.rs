// Adapted from the teacher's random-JSON generator: produces syntactically
// valid documents to throw at the real scanner instead of only hand-picked
// fixtures. Keys are restricted to `k{i}` (no dots, brackets, or backticks)
// so a generated key can always be used as a path component verbatim.

use rand::Rng;
use std::fmt::Write;

/// A flat object with `num_keys` string-valued members, plus the list of
/// keys in insertion order (so callers can pick one to address by path).
pub fn flat_document(num_keys: usize) -> (String, Vec<String>) {
    let mut s = String::new();
    s.push('{');
    let mut keys = Vec::with_capacity(num_keys);
    for i in 0..num_keys {
        if i > 0 {
            s.push(',');
        }
        let key = format!("k{}", i);
        write!(s, "\"{}\":", key).unwrap();
        write_value(&mut s, 0);
        keys.push(key);
    }
    s.push('}');
    (s, keys)
}

fn write_value(s: &mut String, depth: usize) {
    if depth >= 3 {
        write_scalar(s);
        return;
    }
    match rng(5) {
        0 => write_array(s, depth),
        1 => write_object(s, depth),
        _ => write_scalar(s),
    }
}

fn write_scalar(s: &mut String) {
    match rng(4) {
        0 => write_number(s),
        1 => write_string(s),
        2 => s.push_str(if rng_bool() { "true" } else { "false" }),
        _ => s.push_str("null"),
    }
}

fn write_array(s: &mut String, depth: usize) {
    s.push('[');
    for i in 0..rng(4) {
        if i > 0 {
            s.push(',');
        }
        write_value(s, depth + 1);
    }
    s.push(']');
}

fn write_object(s: &mut String, depth: usize) {
    s.push('{');
    for i in 0..rng(4) {
        if i > 0 {
            s.push(',');
        }
        write!(s, "\"f{}\":", i).unwrap();
        write_value(s, depth + 1);
    }
    s.push('}');
}

fn write_number(s: &mut String) {
    if rng_bool() {
        s.push('-');
    }
    write!(s, "{}", rng(1_000_000)).unwrap();
}

fn write_string(s: &mut String) {
    const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 ";
    s.push('"');
    for _ in 0..rng(12) {
        let i = rng(ALPHABET.len());
        s.push_str(&ALPHABET[i..i + 1]);
    }
    s.push('"');
}

fn rng(to: usize) -> usize {
    if to == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..to)
}

fn rng_bool() -> bool {
    rand::random()
}
