//! Corrupt stream detection tests
//!
//! Hand-assembled and hand-damaged streams must be rejected with the right
//! error, never decoded into a wrong document and never panic.

use xcf_rs::{
    decode_bytes, encode_to_vec, ColorMode, Document, EncodeOptions, LayerNode, PixelLayout,
    Raster, XcfError,
};

const COMPRESSION: u32 = 17;
const OPACITY: u32 = 6;
const MODE: u32 = 7;
const ITEM_PATH: u32 = 30;

/// Big-endian stream assembly with the current offset at hand
struct Stream {
    bytes: Vec<u8>,
}

impl Stream {
    /// v003 header for a 1x1 image followed by an uncompressed image property list
    fn rgb_1x1() -> Self {
        let mut stream = Stream { bytes: Vec::new() };
        stream.raw(b"gimp xcf v003\0");
        stream.u32(1).u32(1).u32(0);
        stream.prop(COMPRESSION, &[0]);
        stream.end_props();
        stream
    }

    fn pos(&self) -> u32 {
        self.bytes.len() as u32
    }

    fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    fn u32(&mut self, value: u32) -> &mut Self {
        self.raw(&value.to_be_bytes())
    }

    fn string(&mut self, value: &str) -> &mut Self {
        self.u32(value.len() as u32 + 1).raw(value.as_bytes()).raw(&[0])
    }

    fn prop(&mut self, id: u32, payload: &[u8]) -> &mut Self {
        self.u32(id).u32(payload.len() as u32).raw(payload)
    }

    fn end_props(&mut self) -> &mut Self {
        self.u32(0).u32(0)
    }

    /// Overwrite a 32-bit word written earlier
    fn patch(&mut self, at: u32, value: u32) {
        let at = at as usize;
        self.bytes[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }
}

/// One 1x1 RGBA layer carrying `layer_props`; `extra_tiles` adds bogus entries
/// to the level's tile table
fn one_layer(layer_props: &[(u32, Vec<u8>)], extra_tiles: usize) -> Vec<u8> {
    let mut s = Stream::rgb_1x1();
    let layer_slot = s.pos();
    s.u32(0).u32(0); // layer table
    s.u32(0); // channel table

    let layer = s.pos();
    s.patch(layer_slot, layer);
    s.u32(1).u32(1).u32(1).string("layer");
    for (id, payload) in layer_props {
        s.prop(*id, payload);
    }
    s.end_props();
    let hierarchy_slot = s.pos();
    s.u32(0).u32(0); // hierarchy, mask

    let hierarchy = s.pos();
    s.patch(hierarchy_slot, hierarchy);
    s.u32(1).u32(1).u32(4);
    let level_slot = s.pos();
    s.u32(0).u32(0);

    let level = s.pos();
    s.patch(level_slot, level);
    s.u32(1).u32(1);
    let tile_slot = s.pos();
    s.u32(0);
    for _ in 0..extra_tiles {
        s.u32(level);
    }
    s.u32(0);

    let tile = s.pos();
    s.patch(tile_slot, tile);
    s.raw(&[10, 20, 30, 255]);
    s.bytes
}

#[test]
fn test_hand_built_stream_decodes() {
    let doc = decode_bytes(&one_layer(&[], 0)).unwrap();
    let LayerNode::Image(layer) = &doc.layers[0] else {
        panic!("expected an image layer");
    };
    assert_eq!(layer.props.name, "layer");
    assert_eq!(layer.image.raster().data(), &[10, 20, 30, 255]);
}

#[test]
fn test_bad_magic() {
    let mut bytes = one_layer(&[], 0);
    bytes[..4].copy_from_slice(b"GIMP");
    assert!(matches!(
        decode_bytes(&bytes),
        Err(XcfError::MalformedHeader(_))
    ));
}

#[test]
fn test_future_version() {
    let mut bytes = one_layer(&[], 0);
    bytes[9..13].copy_from_slice(b"v012");
    let err = decode_bytes(&bytes).unwrap_err();
    assert!(err.is_unsupported());
    assert!(matches!(err, XcfError::UnsupportedVersion(token) if token == "v012"));
}

#[test]
fn test_unknown_compression() {
    let mut bytes = one_layer(&[], 0);
    // COMPRESSION payload byte follows the 26-byte header and its 8-byte record head
    assert_eq!(bytes[34], 0);
    bytes[34] = 5;
    assert!(matches!(
        decode_bytes(&bytes),
        Err(XcfError::UnknownCompression(5))
    ));
}

#[test]
fn test_every_prefix_is_rejected() {
    let bytes = one_layer(&[], 0);
    for len in 0..bytes.len() {
        assert!(
            decode_bytes(&bytes[..len]).is_err(),
            "prefix of {} bytes decoded",
            len
        );
    }
}

#[test]
fn test_layer_pointer_past_end() {
    let mut s = Stream::rgb_1x1();
    s.u32(0xFFFF_0000).u32(0).u32(0);
    assert!(matches!(
        decode_bytes(&s.bytes),
        Err(XcfError::UnexpectedEof { offset: 0xFFFF_0000 })
    ));
}

#[test]
fn test_layer_mode_mismatch() {
    let mut s = Stream::rgb_1x1();
    let table = s.pos();
    s.u32(0).u32(0).u32(0);
    let layer = s.pos();
    s.patch(table, layer);
    // Gray layer in an RGB image
    s.u32(1).u32(1).u32(2).string("gray").end_props().u32(0).u32(0);
    assert!(matches!(
        decode_bytes(&s.bytes),
        Err(XcfError::InconsistentData(_))
    ));
}

#[test]
fn test_oversized_layer() {
    let mut s = Stream::rgb_1x1();
    let table = s.pos();
    s.u32(0).u32(0).u32(0);
    let layer = s.pos();
    s.patch(table, layer);
    // Far wider than any image may be, inside a 1x1 document
    s.u32(600_000).u32(1).u32(1).string("wide").end_props().u32(0).u32(0);
    assert!(matches!(
        decode_bytes(&s.bytes),
        Err(XcfError::InconsistentData(_))
    ));
}

#[test]
fn test_shared_tile_pointers_decode() {
    // One 1x1 tile body referenced by a 65x1 layer's two tiles
    let mut s = Stream::rgb_1x1();
    let table = s.pos();
    s.u32(0).u32(0).u32(0);
    let layer = s.pos();
    s.patch(table, layer);
    s.u32(65).u32(1).u32(1).string("tiled").end_props();
    let hierarchy_slot = s.pos();
    s.u32(0).u32(0);
    let hierarchy = s.pos();
    s.patch(hierarchy_slot, hierarchy);
    s.u32(65).u32(1).u32(4);
    let level_slot = s.pos();
    s.u32(0).u32(0);
    let level = s.pos();
    s.patch(level_slot, level);
    s.u32(65).u32(1);
    let tiles = s.pos();
    s.u32(0).u32(0).u32(0);
    let body = s.pos();
    s.patch(tiles, body);
    s.patch(tiles + 4, body);
    // 64 pixels of channel-major RGBA
    for channel in [1u8, 2, 3, 255] {
        s.raw(&[channel; 64]);
    }

    let doc = decode_bytes(&s.bytes).unwrap();
    let LayerNode::Image(layer) = &doc.layers[0] else {
        panic!("expected an image layer");
    };
    let data = layer.image.raster().data();
    assert_eq!(data.len(), 65 * 4);
    assert!(data[..64 * 4].chunks(4).all(|pixel| pixel == [1, 2, 3, 255]));
    // The 1x1 edge tile reads only the first four bytes of the shared body
    assert_eq!(&data[64 * 4..], &[1, 1, 1, 1]);
}

#[test]
fn test_opacity_out_of_range() {
    let bytes = one_layer(&[(OPACITY, 300u32.to_be_bytes().to_vec())], 0);
    assert!(matches!(
        decode_bytes(&bytes),
        Err(XcfError::InvalidOpacity(_))
    ));
}

#[test]
fn test_unknown_blend_mode() {
    let bytes = one_layer(&[(MODE, 99u32.to_be_bytes().to_vec())], 0);
    assert!(matches!(
        decode_bytes(&bytes),
        Err(XcfError::InvalidState { property: MODE, value: 99 })
    ));
}

#[test]
fn test_oversized_property_payload() {
    let bytes = one_layer(&[(OPACITY, vec![0, 0, 0, 10, 0, 0])], 0);
    assert!(matches!(
        decode_bytes(&bytes),
        Err(XcfError::InvalidPropertyList(_))
    ));
}

#[test]
fn test_item_path_without_parent() {
    let mut path = Vec::new();
    path.extend_from_slice(&5u32.to_be_bytes());
    path.extend_from_slice(&0u32.to_be_bytes());
    let bytes = one_layer(&[(ITEM_PATH, path)], 0);
    assert!(matches!(
        decode_bytes(&bytes),
        Err(XcfError::InvalidGroup(_))
    ));
}

#[test]
fn test_extra_tile_pointers() {
    assert!(matches!(
        decode_bytes(&one_layer(&[], 1)),
        Err(XcfError::InconsistentData(_))
    ));
}

#[test]
fn test_flipped_bytes_never_panic() {
    let pixels = (0..96 * 80 * 4).map(|i| (i * 31 % 253) as u8).collect();
    let raster = Raster::from_pixels(96, 80, PixelLayout::Rgba, pixels).unwrap();
    let doc = Document::new(96, 80, ColorMode::Rgb).with_layer(LayerNode::image("noise", raster));
    let bytes = encode_to_vec(&doc, EncodeOptions::default()).unwrap();

    for at in (0..bytes.len()).step_by(37) {
        let mut damaged = bytes.clone();
        damaged[at] ^= 0xA5;
        // Either a clean error or some document; never a panic
        let _ = decode_bytes(&damaged);
    }
}
