#![no_main]

use libfuzzer_sys::fuzz_target;

use contentshare::document::markdown;
use contentshare::fill::prepare::link_out_images;
use contentshare::media::markup::layered_media;
use contentshare::media::{ResolverConfig, SourceIdentifier};
use contentshare::upload::{find_inline_images, strip_inline_images};

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    // None of the markup readers may panic, whatever the input.
    let _ = SourceIdentifier::parse(&text);
    let _ = layered_media(&text, &ResolverConfig::default());
    let _ = markdown::to_html(&text);
    let _ = link_out_images(&text);
    let _ = find_inline_images(&text);
    let _ = strip_inline_images(&text);
});
