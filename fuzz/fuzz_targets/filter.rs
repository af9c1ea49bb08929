#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use tracefilter::channel::{PositionalInput, PositionalOutput};
use tracefilter::{filter_chunks, ChunkParser, ChunkWriter, RecordedEvent};

fuzz_target!(|data: &[u8]| {
    // Jedes zweite Event behalten, damit Mark und Sweep beide greifen
    let Ok(mut parser) = ChunkParser::from_reader(Cursor::new(data)) else { return };
    let Ok(input) = PositionalInput::new(Cursor::new(data)) else { return };
    let output = PositionalOutput::new(Cursor::new(Vec::new()));
    let mut writer = ChunkWriter::new(input, output, Box::new(|e: &RecordedEvent<'_>| e.start_position % 2 == 0));
    let _ = filter_chunks(&mut parser, &mut writer);
});
