//! The bounding polygon: extracted from a KML file, used to crop trip
//! records to the studied area.

use std::path::Path;

use anyhow::{bail, Context};
use quick_xml::events::Event;
use quick_xml::Reader;

/// A closed polygon over geographic coordinates.
#[derive(Debug, Clone)]
pub struct BoundingPolygon {
    /// `(lon, lat)` pairs.
    points: Vec<(f64, f64)>,
}

impl BoundingPolygon {
    pub fn from_kml_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read KML file {}", path.display()))?;
        Self::from_kml_str(&text)
    }

    /// Parse the first `<coordinates>` block: whitespace-separated
    /// `lon,lat[,altitude]` triples.
    pub fn from_kml_str(text: &str) -> anyhow::Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        let mut inside_coordinates = false;
        let mut coordinates = String::new();
        loop {
            match reader.read_event()? {
                Event::Start(e) if e.name().as_ref() == b"coordinates" => {
                    inside_coordinates = true;
                }
                Event::Text(t) if inside_coordinates => {
                    coordinates.push_str(&t.unescape()?);
                    coordinates.push(' ');
                }
                Event::End(e) if e.name().as_ref() == b"coordinates" => break,
                Event::Eof => break,
                _ => {}
            }
        }

        let mut points = Vec::new();
        for triple in coordinates.split_whitespace() {
            let mut parts = triple.split(',');
            let (Some(lon), Some(lat)) = (parts.next(), parts.next()) else {
                bail!("malformed coordinate `{triple}` in KML polygon");
            };
            let lon: f64 = lon
                .parse()
                .with_context(|| format!("bad longitude in `{triple}`"))?;
            let lat: f64 = lat
                .parse()
                .with_context(|| format!("bad latitude in `{triple}`"))?;
            points.push((lon, lat));
        }
        if points.len() < 3 {
            bail!("KML polygon has fewer than 3 points");
        }
        Ok(Self { points })
    }

    /// Even-odd ray cast.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let n = self.points.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.points[i];
            let (xj, yj) = self.points[j];
            if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE_KML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Placemark>
    <Polygon>
      <outerBoundaryIs>
        <LinearRing>
          <coordinates>
            -74.0,40.0,0 -73.0,40.0,0 -73.0,41.0,0 -74.0,41.0,0 -74.0,40.0,0
          </coordinates>
        </LinearRing>
      </outerBoundaryIs>
    </Polygon>
  </Placemark>
</kml>"#;

    #[test]
    fn parses_a_linear_ring() {
        let polygon = BoundingPolygon::from_kml_str(SQUARE_KML).unwrap();
        assert_eq!(polygon.points.len(), 5);
    }

    #[test]
    fn containment_inside_and_outside() {
        let polygon = BoundingPolygon::from_kml_str(SQUARE_KML).unwrap();
        assert!(polygon.contains(-73.5, 40.5));
        assert!(!polygon.contains(-72.5, 40.5));
        assert!(!polygon.contains(-73.5, 41.5));
    }

    #[test]
    fn degenerate_polygon_is_rejected() {
        let kml = "<kml><coordinates>-74.0,40.0 -73.0,40.0</coordinates></kml>";
        assert!(BoundingPolygon::from_kml_str(kml).is_err());
    }
}
