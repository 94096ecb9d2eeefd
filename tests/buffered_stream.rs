//! Buffered stream behavior over real files, plus property tests that
//! buffering never changes the bytes, only the timing.

use penstock::{
    BufferPolicy, BufferedConfig, BufferedStream, FileChannel, MemChannel, OpenMode, Utf8Decoder,
};
use proptest::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn file_write_read_roundtrip_through_small_blocks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks.bin");
    let payload: Vec<u8> = (0..50_000usize).map(|i| (i % 199) as u8).collect();

    let channel = FileChannel::create(&path).unwrap();
    let mut stream = BufferedStream::new(channel, BufferPolicy::Block(512)).unwrap();
    for chunk in payload.chunks(777) {
        stream.write(chunk).unwrap();
    }
    stream.close().unwrap();
    assert_eq!(fs::read(&path).unwrap(), payload);

    let channel = FileChannel::open(&path, OpenMode::Read).unwrap();
    let mut stream = BufferedStream::new(channel, BufferPolicy::Block(512)).unwrap();
    let mut back = Vec::new();
    loop {
        let chunk = stream.read(1013).unwrap();
        if chunk.is_empty() {
            break;
        }
        back.extend_from_slice(&chunk);
    }
    assert_eq!(back, payload);
    assert_eq!(stream.position(), payload.len() as u64);
}

#[test]
fn idempotent_close_on_file_backed_stream() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("close.bin");

    let channel = FileChannel::create(&path).unwrap();
    let mut stream = BufferedStream::new(channel, BufferPolicy::Block(64)).unwrap();
    stream.write(b"last words").unwrap();
    stream.close().unwrap();
    stream.close().unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"last words");
}

#[test]
fn utf8_decoding_across_refill_boundaries() {
    // Multi-byte characters land on every possible refill boundary when
    // the chunk size is 1..4 bytes; the decoder must never split a
    // scalar value.
    let text = "héllo wörld — 😀 végé";
    for chunk in 1..=4usize {
        let config = BufferedConfig::new()
            .with_policy(BufferPolicy::Block(chunk))
            .with_refill_chunk(chunk);
        let mut stream =
            BufferedStream::with_config(MemChannel::from_bytes(text.as_bytes().to_vec()), config)
                .unwrap();

        let mut decoder = Utf8Decoder::new();
        let mut decoded = String::new();
        loop {
            let bytes = stream.read(chunk).unwrap();
            if bytes.is_empty() {
                break;
            }
            decoded.push_str(&decoder.decode(&bytes).unwrap());
        }
        decoder.finish().unwrap();
        assert_eq!(decoded, text, "refill chunk {chunk}");
    }
}

proptest! {
    #[test]
    fn buffering_never_alters_written_bytes(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 0..30),
        block in 1..64usize,
    ) {
        let mut direct = Vec::new();
        let mut stream = BufferedStream::new(MemChannel::new(), BufferPolicy::Block(block)).unwrap();
        for chunk in &chunks {
            direct.extend_from_slice(chunk);
            stream.write(chunk).unwrap();
        }
        stream.flush().unwrap();
        prop_assert_eq!(stream.get_ref().unwrap().contents(), direct.as_slice());
        prop_assert_eq!(stream.position(), direct.len() as u64);
    }

    #[test]
    fn read_chunking_never_alters_bytes(
        payload in prop::collection::vec(any::<u8>(), 0..2000),
        refill in 1..128usize,
        ask in 1..97usize,
    ) {
        let config = BufferedConfig::new()
            .with_policy(BufferPolicy::Line)
            .with_refill_chunk(refill);
        let mut stream =
            BufferedStream::with_config(MemChannel::from_bytes(payload.clone()), config).unwrap();
        let mut back = Vec::new();
        loop {
            let chunk = stream.read(ask).unwrap();
            if chunk.is_empty() {
                break;
            }
            back.extend_from_slice(&chunk);
        }
        prop_assert_eq!(back, payload);
    }

    #[test]
    fn block_fill_stays_below_block_size(
        writes in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 1..20),
        block in 1..128usize,
    ) {
        let mut stream = BufferedStream::new(MemChannel::new(), BufferPolicy::Block(block)).unwrap();
        for chunk in &writes {
            stream.write(chunk).unwrap();
            prop_assert!(stream.buffered_len() < block);
        }
    }
}
