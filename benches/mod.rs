#![cfg(unstable)]
#![feature(test)]
extern crate test;

use subjson::{Command, Operation};

const EVENT: &[u8] = br#"{"id":"3f9a","level":"info","message":"request completed","tags":["http","edge"],"context":{"duration_ms":42,"retries":0}}"#;

#[bench]
fn get_nested_field(b: &mut test::Bencher) {
    b.bytes = EVENT.len() as u64;
    b.iter(|| {
        let mut op = Operation::new();
        op.set_document(EVENT);
        op.set_value(b"");
        op.set_code(Command::GET);
        op.exec(b"context.duration_ms").unwrap();
        test::black_box(op.match_value().len())
    })
}

#[bench]
fn replace_nested_field(b: &mut test::Bencher) {
    b.bytes = EVENT.len() as u64;
    b.iter(|| {
        let mut op = Operation::new();
        op.set_document(EVENT);
        op.set_value(b"99");
        op.set_code(Command::REPLACE);
        op.exec(b"context.duration_ms").unwrap();
        test::black_box(op.new_document())
    })
}

#[bench]
fn array_append(b: &mut test::Bencher) {
    b.bytes = EVENT.len() as u64;
    b.iter(|| {
        let mut op = Operation::new();
        op.set_document(EVENT);
        op.set_value(br#""slow""#);
        op.set_code(Command::ARRAY_APPEND);
        op.exec(b"tags").unwrap();
        test::black_box(op.new_document())
    })
}

#[bench]
fn get_whole_document_value_serde_json(b: &mut test::Bencher) {
    b.bytes = EVENT.len() as u64;
    b.iter(|| {
        let v: serde_json::Value = serde_json::from_slice(EVENT).unwrap();
        v
    })
}
