//! Planar geometry helpers for plot boundaries.
//!
//! Boundaries arrive as GeoJSON (PostGIS `ST_AsGeoJSON` output, already transformed into the
//! projected grouping CRS) and are decoded into `geo` polygons. Everything downstream works in
//! planar CRS units, so distances and buffers share the unit of `proximity_threshold`.

use geo::{
    Area, BooleanOps, Buffer, Centroid, Coord, Distance, Euclidean, LineString, MultiPolygon, Point,
    Polygon, Validation,
};
use serde_json::{json, Value as JsonValue};

#[derive(Debug, Clone, PartialEq)]
pub enum GeometryIssue {
    NotGeoJson,
    UnsupportedType(String),
    InvalidCoordinates,
    MultiplePolygons(usize),
    NonFinite,
    ZeroArea,
    /// Rejected by polygon validation (self-intersection, spike, hole outside or crossing the
    /// shell, too few points).
    Invalid(String),
    NonPositiveArea,
}

impl std::fmt::Display for GeometryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotGeoJson => write!(f, "boundary is not a GeoJSON geometry object"),
            Self::UnsupportedType(kind) => write!(f, "unsupported boundary geometry type {}", kind),
            Self::InvalidCoordinates => write!(f, "boundary coordinates are malformed"),
            Self::MultiplePolygons(count) => {
                write!(f, "boundary has {} disjoint parts; expected one polygon", count)
            }
            Self::NonFinite => write!(f, "boundary contains non-finite coordinates"),
            Self::ZeroArea => write!(f, "boundary encloses no area"),
            Self::Invalid(detail) => write!(f, "boundary is not a valid polygon: {}", detail),
            Self::NonPositiveArea => write!(f, "plot area is not positive"),
        }
    }
}

impl std::error::Error for GeometryIssue {}

fn parse_position(value: &JsonValue) -> Result<Coord<f64>, GeometryIssue> {
    let coords = value.as_array().ok_or(GeometryIssue::InvalidCoordinates)?;
    if coords.len() < 2 {
        return Err(GeometryIssue::InvalidCoordinates);
    }
    let x = coords[0].as_f64().ok_or(GeometryIssue::InvalidCoordinates)?;
    let y = coords[1].as_f64().ok_or(GeometryIssue::InvalidCoordinates)?;
    Ok(Coord { x, y })
}

fn parse_ring(value: &JsonValue) -> Result<LineString<f64>, GeometryIssue> {
    let positions = value.as_array().ok_or(GeometryIssue::InvalidCoordinates)?;
    let coords = positions
        .iter()
        .map(parse_position)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

fn parse_polygon_rings(value: &JsonValue) -> Result<Polygon<f64>, GeometryIssue> {
    let rings = value.as_array().ok_or(GeometryIssue::InvalidCoordinates)?;
    let Some((exterior, interiors)) = rings.split_first() else {
        return Err(GeometryIssue::InvalidCoordinates);
    };
    let exterior = parse_ring(exterior)?;
    let interiors = interiors
        .iter()
        .map(parse_ring)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Decodes a GeoJSON `Polygon` or `MultiPolygon` into its polygons.
pub fn polygons_from_geojson(value: &JsonValue) -> Result<Vec<Polygon<f64>>, GeometryIssue> {
    let obj = value.as_object().ok_or(GeometryIssue::NotGeoJson)?;
    let geo_type = obj
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or(GeometryIssue::NotGeoJson)?;
    let coordinates = obj
        .get("coordinates")
        .ok_or(GeometryIssue::InvalidCoordinates)?;
    match geo_type {
        "Polygon" => Ok(vec![parse_polygon_rings(coordinates)?]),
        "MultiPolygon" => coordinates
            .as_array()
            .ok_or(GeometryIssue::InvalidCoordinates)?
            .iter()
            .map(parse_polygon_rings)
            .collect(),
        other => Err(GeometryIssue::UnsupportedType(other.to_string())),
    }
}

/// Decodes a plot boundary. PostGIS frequently stores single parcels as one-part
/// MultiPolygons, so those are unwrapped; genuinely multi-part boundaries are rejected.
pub fn polygon_from_geojson(value: &JsonValue) -> Result<Polygon<f64>, GeometryIssue> {
    let mut polygons = polygons_from_geojson(value)?;
    match polygons.len() {
        0 => Err(GeometryIssue::InvalidCoordinates),
        1 => Ok(polygons.remove(0)),
        count => Err(GeometryIssue::MultiplePolygons(count)),
    }
}

pub fn multipolygon_to_geojson(value: &MultiPolygon<f64>) -> JsonValue {
    let polygons: Vec<JsonValue> = value
        .0
        .iter()
        .map(|polygon| {
            let rings: Vec<JsonValue> = std::iter::once(polygon.exterior())
                .chain(polygon.interiors().iter())
                .map(ring_to_json)
                .collect();
            JsonValue::Array(rings)
        })
        .collect();
    json!({ "type": "MultiPolygon", "coordinates": polygons })
}

fn ring_to_json(ring: &LineString<f64>) -> JsonValue {
    JsonValue::Array(ring.0.iter().map(|c| json!([c.x, c.y])).collect())
}

pub fn point_to_geojson(value: &Point<f64>) -> JsonValue {
    json!({ "type": "Point", "coordinates": [value.x(), value.y()] })
}

pub fn point_from_geojson(value: &JsonValue) -> Result<Point<f64>, GeometryIssue> {
    let obj = value.as_object().ok_or(GeometryIssue::NotGeoJson)?;
    match obj.get("type").and_then(JsonValue::as_str) {
        Some("Point") => {}
        Some(other) => return Err(GeometryIssue::UnsupportedType(other.to_string())),
        None => return Err(GeometryIssue::NotGeoJson),
    }
    let coord = parse_position(
        obj.get("coordinates")
            .ok_or(GeometryIssue::InvalidCoordinates)?,
    )?;
    Ok(Point::from(coord))
}

/// Accepts only valid simple polygons: finite coordinates, rings that neither self-intersect nor
/// cross each other, holes inside the shell, and positive area.
pub fn check_simple_polygon(polygon: &Polygon<f64>) -> Result<(), GeometryIssue> {
    let all_finite = std::iter::once(polygon.exterior())
        .chain(polygon.interiors().iter())
        .flat_map(|ring| ring.0.iter())
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !all_finite {
        return Err(GeometryIssue::NonFinite);
    }
    if let Some(problem) = polygon.validation_errors().into_iter().next() {
        return Err(GeometryIssue::Invalid(problem.to_string()));
    }
    if polygon.unsigned_area() <= 0.0 {
        return Err(GeometryIssue::ZeroArea);
    }
    Ok(())
}

pub fn polygon_centroid(polygon: &Polygon<f64>) -> Option<Point<f64>> {
    polygon.centroid()
}

pub fn union_all<'a, I>(polygons: I) -> MultiPolygon<f64>
where
    I: IntoIterator<Item = &'a Polygon<f64>>,
{
    polygons
        .into_iter()
        .fold(MultiPolygon::new(Vec::new()), |acc, polygon| {
            acc.union(&MultiPolygon::new(vec![polygon.clone()]))
        })
}

/// Expands a boundary outward; a zero distance returns the input unchanged.
pub fn buffer_outward(value: &MultiPolygon<f64>, distance: f64) -> MultiPolygon<f64> {
    if distance <= 0.0 || value.0.is_empty() {
        return value.clone();
    }
    value.buffer(distance)
}

pub fn multipolygon_centroid(value: &MultiPolygon<f64>) -> Option<Point<f64>> {
    value.centroid()
}

pub fn planar_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    Euclidean.distance(a, b)
}

pub mod geojson_multipolygon {
    use geo::MultiPolygon;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value as JsonValue;

    pub fn serialize<S: Serializer>(value: &MultiPolygon<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        super::multipolygon_to_geojson(value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MultiPolygon<f64>, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        super::polygons_from_geojson(&value)
            .map(MultiPolygon::new)
            .map_err(serde::de::Error::custom)
    }
}

pub mod geojson_point {
    use geo::Point;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value as JsonValue;

    pub fn serialize<S: Serializer>(value: &Point<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        super::point_to_geojson(value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point<f64>, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        super::point_from_geojson(&value).map_err(serde::de::Error::custom)
    }
}

pub mod geojson_point_opt {
    use geo::Point;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value as JsonValue;

    pub fn serialize<S: Serializer>(value: &Option<Point<f64>>, serializer: S) -> Result<S::Ok, S::Error> {
        value
            .as_ref()
            .map(super::point_to_geojson)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Point<f64>>, D::Error> {
        let value = Option::<JsonValue>::deserialize(deserializer)?;
        match value {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => super::point_from_geojson(&value)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
pub(crate) fn square(min_x: f64, min_y: f64, side: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (min_x, min_y),
            (min_x + side, min_y),
            (min_x + side, min_y + side),
            (min_x, min_y + side),
            (min_x, min_y),
        ]),
        vec![],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_polygon_and_single_part_multipolygon() {
        let polygon = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]]]
        });
        let decoded = polygon_from_geojson(&polygon).unwrap();
        assert_eq!(decoded.unsigned_area(), 100.0);

        let multi = json!({
            "type": "MultiPolygon",
            "coordinates": [[[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]]]]
        });
        let decoded = polygon_from_geojson(&multi).unwrap();
        assert_eq!(decoded.unsigned_area(), 16.0);
    }

    #[test]
    fn rejects_multi_part_and_non_polygon_boundaries() {
        let multi = json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
                [[[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 5.0]]]
            ]
        });
        assert_eq!(
            polygon_from_geojson(&multi),
            Err(GeometryIssue::MultiplePolygons(2))
        );

        let line = json!({ "type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]] });
        assert_eq!(
            polygon_from_geojson(&line),
            Err(GeometryIssue::UnsupportedType("LineString".to_string()))
        );
        assert_eq!(
            polygon_from_geojson(&json!("POLYGON((0 0, 1 0, 1 1, 0 0))")),
            Err(GeometryIssue::NotGeoJson)
        );
        let broken = json!({ "type": "Polygon", "coordinates": [[[0.0], [1.0, 0.0]]] });
        assert_eq!(
            polygon_from_geojson(&broken),
            Err(GeometryIssue::InvalidCoordinates)
        );
    }

    #[test]
    fn simple_polygon_check_flags_bowtie_and_degenerate_rings() {
        assert!(check_simple_polygon(&square(0.0, 0.0, 5.0)).is_ok());

        let bowtie = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 4.0), (4.0, 0.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![],
        );
        assert!(matches!(
            check_simple_polygon(&bowtie),
            Err(GeometryIssue::Invalid(_))
        ));

        let sliver = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (2.0, 0.0), (0.0, 0.0)]),
            vec![],
        );
        assert!(check_simple_polygon(&sliver).is_err());

        let flat = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)]),
            vec![],
        );
        assert!(check_simple_polygon(&flat).is_err());
    }

    #[test]
    fn holes_must_stay_inside_the_shell() {
        let shell = LineString::from(vec![
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
            (0.0, 0.0),
        ]);
        let crossing_hole = LineString::from(vec![
            (5.0, 5.0),
            (15.0, 5.0),
            (15.0, 8.0),
            (5.0, 8.0),
            (5.0, 5.0),
        ]);
        let polygon = Polygon::new(shell.clone(), vec![crossing_hole]);
        assert!(matches!(
            check_simple_polygon(&polygon),
            Err(GeometryIssue::Invalid(_))
        ));

        let inner_hole = LineString::from(vec![
            (2.0, 2.0),
            (4.0, 2.0),
            (4.0, 4.0),
            (2.0, 4.0),
            (2.0, 2.0),
        ]);
        assert!(check_simple_polygon(&Polygon::new(shell, vec![inner_hole])).is_ok());
    }

    #[test]
    fn union_merges_touching_squares() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(10.0, 0.0, 10.0);
        let merged = union_all([&a, &b]);
        assert!((merged.unsigned_area() - 200.0).abs() < 1e-6);
        let centroid = multipolygon_centroid(&merged).unwrap();
        assert!((centroid.x() - 10.0).abs() < 1e-6);
        assert!((centroid.y() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn buffer_grows_area_and_zero_buffer_is_identity() {
        let base = MultiPolygon::new(vec![square(0.0, 0.0, 10.0)]);
        assert_eq!(buffer_outward(&base, 0.0), base);
        let grown = buffer_outward(&base, 2.0);
        assert!(grown.unsigned_area() > base.unsigned_area());
        assert!(grown.unsigned_area() < 14.0 * 14.0 + 1e-6);
    }

    #[test]
    fn serializes_group_boundary_as_geojson() {
        let value = multipolygon_to_geojson(&MultiPolygon::new(vec![square(0.0, 0.0, 1.0)]));
        assert_eq!(value["type"], "MultiPolygon");
        assert_eq!(value["coordinates"][0][0][2], json!([1.0, 1.0]));
        assert_eq!(
            point_to_geojson(&Point::new(3.0, 4.0)),
            json!({ "type": "Point", "coordinates": [3.0, 4.0] })
        );
        assert_eq!(planar_distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)), 5.0);
    }
}
