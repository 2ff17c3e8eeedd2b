//! Assigning zones to point locations.
//!
//! Points are matched to the zone whose polygon contains them. Candidate
//! zones come from an R* tree over zone bounding boxes, so each point is
//! only tested against the few polygons that could possibly contain it.
//! Points outside every polygon can optionally be fixed by taking the zone
//! with the nearest centroid, which is looked up in a second R* tree.

use crate::error::{Error, Result, SchemaError};
use crate::table::Table;
use crate::traits::Enrich;
use geo::{BoundingRect, Centroid, Contains, MultiPolygon};
use geojson::{GeoJson, JsonValue};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Result<Point> {
        let id = id.into();
        if !x.is_finite() || !y.is_finite() {
            return Err(Error::InvalidGeometry {
                id,
                reason: format!("non-finite coordinate ({}, {})", x, y),
            });
        }
        Ok(Point { id, x, y })
    }
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub attributes: BTreeMap<String, String>,
    centroid: (f64, f64),
}

impl Zone {
    pub fn new(id: impl Into<String>, geometry: geo::Geometry<f64>) -> Result<Zone> {
        let id = id.into();
        let invalid = |reason: String| Error::InvalidGeometry {
            id: id.clone(),
            reason,
        };

        let geometry = match geometry {
            geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
            geo::Geometry::MultiPolygon(mp) => mp,
            other => {
                return Err(invalid(format!(
                    "expected a polygon, found {}",
                    geometry_kind(&other)
                )))
            }
        };
        if geometry.0.is_empty() {
            return Err(invalid("empty multipolygon".to_string()));
        }
        for polygon in &geometry.0 {
            if polygon.exterior().0.len() < 4 {
                return Err(invalid("exterior ring has fewer than 4 points".to_string()));
            }
            let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
            for ring in rings {
                if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
                    return Err(invalid("non-finite coordinate".to_string()));
                }
            }
        }
        let centroid = geometry
            .centroid()
            .ok_or_else(|| invalid("polygon has no centroid".to_string()))?;

        Ok(Zone {
            id,
            geometry,
            attributes: BTreeMap::new(),
            centroid: (centroid.x(), centroid.y()),
        })
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Zone {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn centroid(&self) -> (f64, f64) {
        self.centroid
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.geometry.contains(&geo::Point::new(x, y))
    }
}

fn geometry_kind(g: &geo::Geometry<f64>) -> &'static str {
    match g {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

/// Read zones from a GeoJSON feature collection. The zone id and every
/// requested attribute are taken from the feature properties.
pub fn load_zones<P: AsRef<Path>>(
    path: P,
    id_field: &str,
    attributes: &[&str],
) -> Result<Vec<Zone>> {
    let geojson: GeoJson = fs::read_to_string(path)?.parse()?;
    zones_from_geojson(geojson, id_field, attributes)
}

pub fn zones_from_geojson(
    geojson: GeoJson,
    id_field: &str,
    attributes: &[&str],
) -> Result<Vec<Zone>> {
    let features = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => {
            return Err(SchemaError::MissingColumn(id_field.to_string()).into())
        }
    };

    features
        .into_iter()
        .map(|feature| -> Result<Zone> {
            let id = feature
                .property(id_field)
                .map(property_to_string)
                .ok_or_else(|| SchemaError::MissingColumn(id_field.to_string()))?;
            let mut attrs = BTreeMap::new();
            for name in attributes {
                let value = feature
                    .property(name)
                    .map(property_to_string)
                    .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))?;
                attrs.insert(name.to_string(), value);
            }
            let geometry = feature.geometry.ok_or_else(|| Error::InvalidGeometry {
                id: id.clone(),
                reason: "feature has no geometry".to_string(),
            })?;
            let geometry: geo::Geometry<f64> =
                geo::Geometry::try_from(geometry.value).map_err(|e| Error::InvalidGeometry {
                    id: id.clone(),
                    reason: e.to_string(),
                })?;
            let mut zone = Zone::new(id, geometry)?;
            zone.attributes = attrs;
            Ok(zone)
        })
        .collect()
}

fn property_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

struct ZoneEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for ZoneEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

struct ZoneCentroid {
    index: usize,
    position: [f64; 2],
}

impl RTreeObject for ZoneCentroid {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for ZoneCentroid {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx * dx + dy * dy
    }
}

/// How a point ended up with its zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMethod {
    Contains,
    Centroid,
    Unmatched,
}

/// The zones of one run, indexed for containment and centroid lookups.
pub struct ZoneIndex {
    id_field: String,
    zones: Vec<Zone>,
    envelopes: RTree<ZoneEnvelope>,
    centroids: RTree<ZoneCentroid>,
}

impl ZoneIndex {
    pub fn new(id_field: &str, zones: Vec<Zone>) -> Result<ZoneIndex> {
        let mut seen = HashSet::new();
        for zone in &zones {
            if !seen.insert(zone.id.as_str()) {
                return Err(Error::DuplicateId {
                    kind: "zone",
                    id: zone.id.clone(),
                });
            }
        }

        let envelopes = zones
            .iter()
            .enumerate()
            .filter_map(|(index, zone)| {
                zone.geometry.bounding_rect().map(|rect| ZoneEnvelope {
                    index,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();
        let centroids = zones
            .iter()
            .enumerate()
            .map(|(index, zone)| ZoneCentroid {
                index,
                position: [zone.centroid.0, zone.centroid.1],
            })
            .collect();

        Ok(ZoneIndex {
            id_field: id_field.to_string(),
            zones,
            envelopes: RTree::bulk_load(envelopes),
            centroids: RTree::bulk_load(centroids),
        })
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Indices of every zone whose polygon contains the location, ascending
    pub fn containing(&self, x: f64, y: f64) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .envelopes
            .locate_in_envelope_intersecting(&AABB::from_point([x, y]))
            .map(|e| e.index)
            .filter(|&i| self.zones[i].contains(x, y))
            .collect();
        hits.sort_unstable();
        hits
    }

    pub fn nearest_centroid(&self, x: f64, y: f64) -> Option<usize> {
        self.centroids.nearest_neighbor(&[x, y]).map(|c| c.index)
    }

    fn centroid_distance_2(&self, index: usize, x: f64, y: f64) -> f64 {
        let (cx, cy) = self.zones[index].centroid;
        (cx - x).powi(2) + (cy - y).powi(2)
    }

    /// Resolve one location to at most one zone. Several containing zones
    /// (a point on a shared edge of overlapping inputs) resolve to the one
    /// with the nearest centroid, lowest index first on ties.
    pub fn locate(&self, x: f64, y: f64, fix_by_distance: bool) -> (Option<usize>, JoinMethod) {
        let hits = self.containing(x, y);
        match hits.len() {
            0 if fix_by_distance => match self.nearest_centroid(x, y) {
                Some(i) => (Some(i), JoinMethod::Centroid),
                None => (None, JoinMethod::Unmatched),
            },
            0 => (None, JoinMethod::Unmatched),
            1 => (Some(hits[0]), JoinMethod::Contains),
            _ => {
                let best = hits.iter().copied().min_by(|&a, &b| {
                    self.centroid_distance_2(a, x, y)
                        .total_cmp(&self.centroid_distance_2(b, x, y))
                        .then(a.cmp(&b))
                });
                (best, JoinMethod::Contains)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZonedPoint {
    pub point: Point,
    /// index into the zones of the `ZoneIndex` used for the join
    pub zone: Option<usize>,
    pub method: JoinMethod,
}

impl ZonedPoint {
    pub fn zone_id<'a>(&self, zones: &'a ZoneIndex) -> Option<&'a str> {
        self.zone.map(|i| zones.zones[i].id.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpatialJoiner {
    pub fix_by_distance: bool,
    pub chunk_size: usize,
}

impl Default for SpatialJoiner {
    fn default() -> Self {
        SpatialJoiner {
            fix_by_distance: true,
            chunk_size: 10_000,
        }
    }
}

impl SpatialJoiner {
    /// Exactly one `ZonedPoint` per input point, in input order. Chunks only
    /// bound the work handed to each worker; the result does not depend on
    /// the chunk size.
    pub fn join(&self, points: &[Point], zones: &ZoneIndex) -> Result<Vec<ZonedPoint>> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".to_string()));
        }
        let mut seen = HashSet::with_capacity(points.len());
        for p in points {
            if !seen.insert(p.id.as_str()) {
                return Err(Error::DuplicateId {
                    kind: "point",
                    id: p.id.clone(),
                });
            }
        }

        info!(
            "Imputing {} zones into {} points by spatial join...",
            zones.len(),
            points.len()
        );

        let n_chunks = (points.len() + self.chunk_size - 1) / self.chunk_size;
        let bar = ProgressBar::new(n_chunks as u64);
        bar.set_style(
            ProgressStyle::with_template("[{elapsed}] {wide_bar} {pos}/{len} chunks ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let chunks: Vec<Vec<ZonedPoint>> = points
            .par_chunks(self.chunk_size)
            .map(|chunk| {
                let zoned = chunk
                    .iter()
                    .map(|p| {
                        let (zone, method) = zones.locate(p.x, p.y, self.fix_by_distance);
                        ZonedPoint {
                            point: p.clone(),
                            zone,
                            method,
                        }
                    })
                    .collect();
                bar.inc(1);
                zoned
            })
            .collect();
        bar.finish_and_clear();

        let result: Vec<ZonedPoint> = chunks.into_iter().flatten().collect();

        let fixed = result
            .iter()
            .filter(|z| z.method == JoinMethod::Centroid)
            .count();
        if fixed > 0 {
            info!("  Fixed {} points by centroid distance join", fixed);
        }
        let unmatched = result
            .iter()
            .filter(|z| z.method == JoinMethod::Unmatched)
            .count();
        if unmatched > 0 {
            info!("  {} points are outside every zone", unmatched);
        }
        debug!("{} chunks of at most {} points", n_chunks, self.chunk_size);

        Ok(result)
    }
}

pub fn points_from_table(table: &Table, id_field: &str, x_field: &str, y_field: &str) -> Result<Vec<Point>> {
    let id = table.column(id_field)?;
    let x = table.column(x_field)?;
    let y = table.column(y_field)?;
    (0..table.len())
        .map(|row| {
            Point::new(
                table.cell(row, id),
                table.numeric(row, x)?,
                table.numeric(row, y)?,
            )
        })
        .collect()
}

/// Picks one home location per agent out of a trip table
#[derive(Debug, Clone)]
pub struct HomeSelection {
    pub person_field: String,
    pub purpose_field: String,
    pub home_purpose: String,
    pub x_field: String,
    pub y_field: String,
    /// agents whose id contains any of these are skipped
    pub exclude: Vec<String>,
}

impl Default for HomeSelection {
    fn default() -> Self {
        HomeSelection {
            person_field: "person_id".to_string(),
            purpose_field: "preceedingPurpose".to_string(),
            home_purpose: "home".to_string(),
            x_field: "origin_x".to_string(),
            y_field: "origin_y".to_string(),
            exclude: vec!["freight".to_string()],
        }
    }
}

impl HomeSelection {
    /// A table of `person, x, y`, one row per agent that departs from home at
    /// least once. The first home departure of an agent wins.
    pub fn select(&self, trips: &Table) -> Result<Table> {
        let person = trips.column(&self.person_field)?;
        let purpose = trips.column(&self.purpose_field)?;
        let x = trips.column(&self.x_field)?;
        let y = trips.column(&self.y_field)?;

        let mut out = Table::new(vec![
            self.person_field.clone(),
            "x".to_string(),
            "y".to_string(),
        ])?;
        let mut seen = HashSet::new();
        for (i, row) in trips.rows().iter().enumerate() {
            if row[purpose] != self.home_purpose
                || self.exclude.iter().any(|e| row[person].contains(e.as_str()))
                || !seen.insert(row[person].as_str())
            {
                continue;
            }
            // validate now so bad coordinates point at the trip row
            trips.numeric(i, x)?;
            trips.numeric(i, y)?;
            out.push_row(vec![row[person].clone(), row[x].clone(), row[y].clone()])?;
        }
        info!("Selected {} home locations", out.len());
        Ok(out)
    }
}

/// Appends the zone id and zone attributes to a table of point locations
pub struct ZoneImputation<'a> {
    pub joiner: SpatialJoiner,
    pub zones: &'a ZoneIndex,
    pub point_id_field: String,
    pub x_field: String,
    pub y_field: String,
    pub zone_attributes: Vec<String>,
}

impl Enrich for ZoneImputation<'_> {
    fn enrich(&self, table: &Table) -> Result<Table> {
        let zone_id_field = self.zones.id_field();
        if table.has_column(zone_id_field) {
            return Err(SchemaError::DuplicateColumn(zone_id_field.to_string()).into());
        }
        for name in &self.zone_attributes {
            if table.has_column(name) {
                return Err(SchemaError::DuplicateColumn(name.clone()).into());
            }
            if let Some(zone) = self.zones.zones().first() {
                if !zone.attributes.contains_key(name) {
                    return Err(SchemaError::MissingColumn(name.clone()).into());
                }
            }
        }

        let points = points_from_table(table, &self.point_id_field, &self.x_field, &self.y_field)?;
        let zoned = self.joiner.join(&points, self.zones)?;

        let mut out = table.clone();
        let ids = zoned
            .iter()
            .map(|z| z.zone_id(self.zones).unwrap_or_default().to_string())
            .collect();
        out.append_column(zone_id_field, ids)?;
        for name in &self.zone_attributes {
            let values = zoned
                .iter()
                .map(|z| {
                    z.zone
                        .and_then(|i| self.zones.zones()[i].attributes.get(name).cloned())
                        .unwrap_or_default()
                })
                .collect();
            out.append_column(name, values)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use geo::polygon;

    fn square(id: &str, x0: f64, y0: f64, size: f64) -> Zone {
        let p = polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ];
        Zone::new(id, geo::Geometry::Polygon(p)).unwrap()
    }

    fn three_squares() -> ZoneIndex {
        ZoneIndex::new(
            "municipality_id",
            vec![
                square("A", 0.0, 0.0, 10.0).with_attribute("canton_id", "1"),
                square("B", 20.0, 0.0, 10.0).with_attribute("canton_id", "2"),
                square("C", 0.0, 40.0, 10.0).with_attribute("canton_id", "3"),
            ],
        )
        .unwrap()
    }

    fn five_points() -> Vec<Point> {
        vec![
            Point::new("1", 1.0, 1.0).unwrap(),
            Point::new("2", 9.0, 5.0).unwrap(),
            Point::new("3", 21.0, 2.0).unwrap(),
            Point::new("4", 28.0, 8.0).unwrap(),
            // centroid distances: A (5,5) ~ 14.9, B (25,5) ~ 13.5, C (5,45) ~ 32.0
            Point::new("5", 16.0, 15.0).unwrap(),
        ]
    }

    fn zone_ids(zoned: &[ZonedPoint], zones: &ZoneIndex) -> Vec<Option<String>> {
        zoned
            .iter()
            .map(|z| z.zone_id(zones).map(String::from))
            .collect()
    }

    #[test]
    fn test_fix_by_distance() {
        let zones = three_squares();
        let zoned = SpatialJoiner::default().join(&five_points(), &zones).unwrap();
        assert_eq!(
            zone_ids(&zoned, &zones),
            vec![
                Some("A".to_string()),
                Some("A".to_string()),
                Some("B".to_string()),
                Some("B".to_string()),
                Some("B".to_string()),
            ]
        );
        assert_eq!(zoned[4].method, JoinMethod::Centroid);
        assert_eq!(zoned[0].method, JoinMethod::Contains);
    }

    #[test]
    fn test_without_fallback_outside_is_null() {
        let zones = three_squares();
        let joiner = SpatialJoiner {
            fix_by_distance: false,
            ..SpatialJoiner::default()
        };
        let zoned = joiner.join(&five_points(), &zones).unwrap();
        assert_eq!(zoned.len(), 5);
        assert_eq!(zoned[4].zone, None);
        assert_eq!(zoned[4].method, JoinMethod::Unmatched);
        assert_eq!(zoned[3].zone_id(&zones), Some("B"));
    }

    #[test]
    fn test_chunk_size_does_not_change_result() {
        let zones = three_squares();
        let points: Vec<_> = (0..97)
            .map(|i| {
                let x = (i * 7 % 50) as f64 - 5.0;
                let y = (i * 13 % 60) as f64 - 5.0;
                Point::new(i.to_string(), x, y).unwrap()
            })
            .collect();

        let whole = SpatialJoiner {
            chunk_size: points.len(),
            ..SpatialJoiner::default()
        }
        .join(&points, &zones)
        .unwrap();

        for chunk_size in [1, 2, 10, 33, 96, 1000] {
            let chunked = SpatialJoiner {
                chunk_size,
                ..SpatialJoiner::default()
            }
            .join(&points, &zones)
            .unwrap();
            assert_eq!(chunked, whole, "chunk size {}", chunk_size);
        }

        // one row per input point, ids unchanged
        assert_eq!(whole.len(), points.len());
        for (z, p) in whole.iter().zip(&points) {
            assert_eq!(z.point.id, p.id);
        }
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let zones = three_squares();
        let joiner = SpatialJoiner {
            chunk_size: 0,
            ..SpatialJoiner::default()
        };
        assert!(matches!(
            joiner.join(&five_points(), &zones),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_point_ids_rejected() {
        let zones = three_squares();
        let points = vec![
            Point::new("1", 1.0, 1.0).unwrap(),
            Point::new("1", 2.0, 2.0).unwrap(),
        ];
        assert!(matches!(
            SpatialJoiner::default().join(&points, &zones),
            Err(Error::DuplicateId { kind: "point", .. })
        ));
    }

    #[test]
    fn test_overlapping_zones_resolve_to_one() {
        let zones = ZoneIndex::new(
            "id",
            vec![square("big", 0.0, 0.0, 100.0), square("small", 0.0, 0.0, 10.0)],
        )
        .unwrap();
        assert_eq!(zones.containing(2.0, 2.0), vec![0, 1]);
        let (zone, method) = zones.locate(2.0, 2.0, false);
        assert_eq!(zone, Some(1));
        assert_eq!(method, JoinMethod::Contains);
    }

    #[test]
    fn test_non_polygon_is_invalid() {
        let err = Zone::new("x", geo::Geometry::Point(geo::Point::new(1.0, 2.0))).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry { .. }));
    }

    #[test]
    fn test_load_zones_from_geojson() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"GMDNR": 261, "canton_id": 1},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]]
                    }
                }
            ]
        }"#;
        let zones = zones_from_geojson(raw.parse().unwrap(), "GMDNR", &["canton_id"]).unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].id, "261");
        assert_eq!(zones[0].attributes["canton_id"], "1");
        assert_eq!(zones[0].centroid(), (5.0, 5.0));

        let err = zones_from_geojson(raw.parse().unwrap(), "BFS", &[]).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::MissingColumn(ref c)) if c == "BFS"));
    }

    #[test]
    fn test_geojson_line_is_invalid_geometry() {
        let raw = r#"{
            "type": "Feature",
            "properties": {"id": "a"},
            "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]}
        }"#;
        let err = zones_from_geojson(raw.parse().unwrap(), "id", &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry { ref id, .. } if id == "a"));
    }

    #[test]
    fn test_home_selection_one_per_agent() {
        let trips = Table::from_rows(
            ["person_id", "preceedingPurpose", "origin_x", "origin_y"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec![
                vec!["1", "home", "1.0", "1.0"],
                vec!["1", "work", "5.0", "5.0"],
                vec!["1", "home", "2.0", "2.0"],
                vec!["2", "work", "3.0", "3.0"],
                vec!["3", "home", "21.0", "2.0"],
                vec!["freight_7", "home", "4.0", "4.0"],
            ]
            .into_iter()
            .map(|r| r.into_iter().map(String::from).collect())
            .collect(),
        )
        .unwrap();
        let homes = HomeSelection::default().select(&trips).unwrap();
        assert_eq!(homes.len(), 2);
        assert_eq!(homes.rows()[0], vec!["1", "1.0", "1.0"]);
        assert_eq!(homes.rows()[1], vec!["3", "21.0", "2.0"]);
    }

    #[test]
    fn test_zone_imputation_appends_columns() {
        let zones = three_squares();
        let table = Table::from_rows(
            vec!["person_id".into(), "x".into(), "y".into()],
            vec![
                vec!["1".into(), "1".into(), "1".into()],
                vec!["2".into(), "16".into(), "15".into()],
            ],
        )
        .unwrap();
        let stage = ZoneImputation {
            joiner: SpatialJoiner::default(),
            zones: &zones,
            point_id_field: "person_id".into(),
            x_field: "x".into(),
            y_field: "y".into(),
            zone_attributes: vec!["canton_id".into()],
        };
        let out = stage.enrich(&table).unwrap();
        assert_eq!(out.headers(), &["person_id", "x", "y", "municipality_id", "canton_id"]);
        assert_eq!(out.rows()[0][3..], ["A".to_string(), "1".to_string()]);
        assert_eq!(out.rows()[1][3..], ["B".to_string(), "2".to_string()]);

        // zone id already on the point table is ambiguous
        let out_again = stage.enrich(&out).unwrap_err();
        assert!(matches!(out_again, Error::Schema(SchemaError::DuplicateColumn(_))));
    }
}
