//! TileJSON 3.0.0 documents for archives.

use serde::Serialize;
use serde_json::Value;

use crate::archive::{Header, Metadata, TileType};

/// TileJSON specification version produced.
pub const TILEJSON_VERSION: &str = "3.0.0";

/// Placeholder in tile URL templates replaced by the archive id.
pub const ARCHIVE_PLACEHOLDER: &str = "{archive}";

/// A TileJSON document describing one archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileJson {
    pub tilejson: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub attribution: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
    pub bounds: [f64; 4],
    /// `[lon, lat, zoom]`
    pub center: [f64; 3],
    pub minzoom: u8,
    pub maxzoom: u8,
    pub tiles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_layers: Option<Vec<Value>>,
}

impl TileJson {
    /// Assembles the document from the archive header and metadata.
    ///
    /// Header fields are authoritative for the zoom range, bounds, center and
    /// tile format; the descriptive fields come from metadata with fallbacks.
    /// Bounds or center left all-zero in the header are taken from metadata
    /// when it carries them.
    /// Every `{archive}` in `tile_url_template` becomes `archive_id`; the
    /// `{z}/{x}/{y}` placeholders are left for the client.
    pub fn build(
        archive_id: &str,
        header: &Header,
        metadata: &Metadata,
        tile_url_template: &str,
    ) -> Self {
        let kind = if header.tile_type.is_vector() {
            "vector"
        } else {
            "raster"
        };
        let format = match header.tile_type {
            TileType::Unknown => metadata.format().unwrap_or_default(),
            other => other.format().unwrap_or_default(),
        };

        Self {
            tilejson: TILEJSON_VERSION.to_string(),
            name: metadata.name().unwrap_or(archive_id).to_string(),
            description: metadata.description().unwrap_or_default().to_string(),
            version: metadata.version().unwrap_or("1.0.0").to_string(),
            attribution: metadata.attribution().unwrap_or_default().to_string(),
            kind: kind.to_string(),
            format: format.to_string(),
            bounds: bounds(header, metadata),
            center: center(header, metadata),
            minzoom: header.min_zoom,
            maxzoom: header.max_zoom,
            tiles: vec![tile_url_template.replace(ARCHIVE_PLACEHOLDER, archive_id)],
            vector_layers: metadata.vector_layers().cloned(),
        }
    }

    pub fn to_value(&self) -> Value {
        // Serializing plain strings, numbers and JSON values cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn bounds(header: &Header, metadata: &Metadata) -> [f64; 4] {
    let declared = header.bounds.to_array();
    if declared.iter().all(|&v| v == 0.0) {
        metadata.bounds().unwrap_or(declared)
    } else {
        declared
    }
}

fn center(header: &Header, metadata: &Metadata) -> [f64; 3] {
    let c = header.center;
    let declared = [c.lon, c.lat, f64::from(c.zoom)];
    if declared.iter().all(|&v| v == 0.0) {
        metadata.center().unwrap_or(declared)
    } else {
        declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixture::{encode_header, HeaderFields};
    use crate::archive::{Bounds, Center};
    use crate::compression::Compression;
    use serde_json::json;

    fn header(tile_type: TileType) -> Header {
        let bytes = encode_header(&HeaderFields {
            root: (127, 10),
            metadata: (137, 0),
            leaves: (137, 0),
            tiles: (137, 0),
            internal: Compression::Gzip,
            tile: Compression::Gzip,
            tile_type,
            min_zoom: 0,
            max_zoom: 14,
        });
        Header::decode(&bytes, 137).unwrap()
    }

    #[test]
    fn test_vector_document() {
        let metadata = Metadata::from_value(json!({
            "name": "Postcodes",
            "attribution": "© contributors",
            "vector_layers": [{"id": "zcta", "fields": {}}]
        }));
        let doc = TileJson::build(
            "zcta",
            &header(TileType::Mvt),
            &metadata,
            "https://tiles.example.com/{archive}/{z}/{x}/{y}.mvt",
        );

        assert_eq!(doc.tilejson, "3.0.0");
        assert_eq!(doc.name, "Postcodes");
        assert_eq!(doc.description, "");
        assert_eq!(doc.version, "1.0.0");
        assert_eq!(doc.kind, "vector");
        assert_eq!(doc.format, "pbf");
        assert_eq!(doc.minzoom, 0);
        assert_eq!(doc.maxzoom, 14);
        assert_eq!(
            doc.tiles,
            vec!["https://tiles.example.com/zcta/{z}/{x}/{y}.mvt".to_string()]
        );
        assert_eq!(doc.vector_layers.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_raster_document_defaults() {
        let doc = TileJson::build(
            "ortho",
            &header(TileType::Webp),
            &Metadata::default(),
            "/tiles/{archive}/{z}/{x}/{y}",
        );
        assert_eq!(doc.name, "ortho");
        assert_eq!(doc.kind, "raster");
        assert_eq!(doc.format, "webp");
        assert_eq!(doc.vector_layers, None);
    }

    #[test]
    fn test_unknown_tile_type_uses_metadata_format() {
        let metadata = Metadata::from_value(json!({"format": "geojson"}));
        let doc = TileJson::build("x", &header(TileType::Unknown), &metadata, "/{archive}");
        assert_eq!(doc.kind, "raster");
        assert_eq!(doc.format, "geojson");
    }

    #[test]
    fn test_serialized_field_names() {
        let doc = TileJson::build("a", &header(TileType::Png), &Metadata::default(), "/{archive}");
        let value = doc.to_value();
        assert_eq!(value["type"], "raster");
        assert_eq!(value["format"], "png");
        assert_eq!(value["center"].as_array().map(Vec::len), Some(3));
        assert!(value.get("vector_layers").is_none());
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn test_header_bounds_and_center_win_over_metadata() {
        let metadata = Metadata::from_value(json!({
            "bounds": [1.0, 2.0, 3.0, 4.0],
            "center": [2.0, 3.0, 7]
        }));
        let doc = TileJson::build("a", &header(TileType::Mvt), &metadata, "/{archive}");
        assert_eq!(doc.bounds, [-180.0, -85.0, 180.0, 85.0]);
        assert_eq!(doc.center, [0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_unset_header_geometry_falls_back_to_metadata() {
        let mut header = header(TileType::Mvt);
        header.bounds = Bounds {
            min_lon: 0.0,
            min_lat: 0.0,
            max_lon: 0.0,
            max_lat: 0.0,
        };
        header.center = Center {
            lon: 0.0,
            lat: 0.0,
            zoom: 0,
        };

        let metadata = Metadata::from_value(json!({
            "bounds": "-125.0,24.5,-66.9,49.4",
            "center": [-95.7, 37.1, 4]
        }));
        let doc = TileJson::build("a", &header, &metadata, "/{archive}");
        assert_eq!(doc.bounds, [-125.0, 24.5, -66.9, 49.4]);
        assert_eq!(doc.center, [-95.7, 37.1, 4.0]);

        let bare = TileJson::build("a", &header, &Metadata::default(), "/{archive}");
        assert_eq!(bare.bounds, [0.0; 4]);
        assert_eq!(bare.center, [0.0; 3]);
    }
}
