#![no_main]

use libfuzzer_sys::fuzz_target;
use multipart_ota::{FileDisposition, FileInfo, FormData, FormHandler, MultipartDecoder, Rejection};

struct AcceptAll;

impl FormHandler for AcceptAll {
    fn on_file(&mut self, _file: &FileInfo) -> Result<FileDisposition, Rejection> {
        Ok(FileDisposition::Accept)
    }
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // The first byte picks the chunk size so that carry handling is exercised.
    let chunk_size = usize::from(data[0]).max(1);
    let body = &data[1..];

    let mut decoder = MultipartDecoder::new("X-BOUNDARY", FormData::new(AcceptAll));
    for chunk in body.chunks(chunk_size) {
        assert_eq!(decoder.write(chunk), chunk.len());
    }
    let first = decoder.finish();
    assert_eq!(decoder.finish(), first);
});
