use crate::pipeline::types::CountState;
use crate::run_artifacts::Point;
use geo::{BoundingRect, Contains, Intersects};
use geo_types::{Coord, Line, LineString, Point as GeoPoint, Polygon};

/// Which way a tracked object moved across the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn apply(self, counts: &mut CountState) {
        match self {
            Direction::In => counts.in_count += 1,
            Direction::Out => counts.out_count += 1,
        }
    }
}

/// Geometric form of a counting region.
#[derive(Debug, Clone)]
pub enum CountingRegion {
    Line(Line<f64>),
    Polygon(Polygon<f64>),
}

fn to_coord(p: &Point) -> Coord<f64> {
    Coord {
        x: p.x as f64,
        y: p.y as f64,
    }
}

/// Convert our pipeline points to a geo_types Polygon
fn to_geo_polygon(points: &[Point]) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = points.iter().map(to_coord).collect();
    Polygon::new(LineString::from(coords), vec![])
}

impl CountingRegion {
    /// Two points make a line, three or more a polygon. Anything shorter
    /// cannot count and yields `None`.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        match points.len() {
            0 | 1 => None,
            2 => Some(CountingRegion::Line(Line::new(
                to_coord(&points[0]),
                to_coord(&points[1]),
            ))),
            _ => Some(CountingRegion::Polygon(to_geo_polygon(points))),
        }
    }

    /// Classifies the move of a track centroid from `prev` to `curr`.
    ///
    /// Lines count a move whose path intersects the line; polygons count when
    /// the new position lies inside. Direction follows the axis across the
    /// region: for a region taller than wide, +x is "in", otherwise +y is "in".
    pub fn crossing(&self, prev: Point, curr: Point) -> Option<Direction> {
        let (p, c) = (to_coord(&prev), to_coord(&curr));

        let (hit, vertical) = match self {
            CountingRegion::Line(line) => {
                let path = Line::new(p, c);
                let dx = (line.end.x - line.start.x).abs();
                let dy = (line.end.y - line.start.y).abs();
                (path.intersects(line), dx < dy)
            }
            CountingRegion::Polygon(polygon) => {
                let vertical = polygon
                    .bounding_rect()
                    .map(|r| r.width() < r.height())
                    .unwrap_or(false);
                (polygon.contains(&GeoPoint::from(c)), vertical)
            }
        };

        if !hit {
            return None;
        }

        let forward = if vertical { c.x > p.x } else { c.y > p.y };
        Some(if forward { Direction::In } else { Direction::Out })
    }

    /// Vertices in drawing order (closed polygons repeat the first vertex).
    pub fn outline(&self) -> Vec<Point> {
        let to_point = |c: &Coord<f64>| Point::new(c.x as f32, c.y as f32);
        match self {
            CountingRegion::Line(line) => vec![to_point(&line.start), to_point(&line.end)],
            CountingRegion::Polygon(polygon) => polygon.exterior().coords().map(to_point).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_line() -> CountingRegion {
        CountingRegion::from_points(&[Point::new(2300.0, 20.0), Point::new(2300.0, 2100.0)])
            .unwrap()
    }

    #[test]
    fn test_region_kind_from_point_count() {
        assert!(CountingRegion::from_points(&[]).is_none());
        assert!(CountingRegion::from_points(&[Point::new(1.0, 1.0)]).is_none());
        assert!(matches!(vertical_line(), CountingRegion::Line(_)));

        let rect = [
            Point::new(20.0, 400.0),
            Point::new(1080.0, 400.0),
            Point::new(1080.0, 360.0),
            Point::new(20.0, 360.0),
        ];
        assert!(matches!(
            CountingRegion::from_points(&rect),
            Some(CountingRegion::Polygon(_))
        ));
        // Three points pass through as a polygon rather than being rejected.
        assert!(matches!(
            CountingRegion::from_points(&rect[..3]),
            Some(CountingRegion::Polygon(_))
        ));
    }

    #[test]
    fn test_vertical_line_crossing_directions() {
        let line = vertical_line();
        assert_eq!(
            line.crossing(Point::new(2290.0, 500.0), Point::new(2310.0, 505.0)),
            Some(Direction::In)
        );
        assert_eq!(
            line.crossing(Point::new(2310.0, 500.0), Point::new(2290.0, 505.0)),
            Some(Direction::Out)
        );
        // Moving alongside the line without crossing it.
        assert_eq!(
            line.crossing(Point::new(2200.0, 500.0), Point::new(2250.0, 900.0)),
            None
        );
        // Passing beyond the end of the segment.
        assert_eq!(
            line.crossing(Point::new(2290.0, 2150.0), Point::new(2310.0, 2150.0)),
            None
        );
    }

    #[test]
    fn test_horizontal_line_uses_y_axis() {
        let line =
            CountingRegion::from_points(&[Point::new(0.0, 100.0), Point::new(500.0, 100.0)])
                .unwrap();
        assert_eq!(
            line.crossing(Point::new(50.0, 90.0), Point::new(50.0, 110.0)),
            Some(Direction::In)
        );
        assert_eq!(
            line.crossing(Point::new(50.0, 110.0), Point::new(50.0, 90.0)),
            Some(Direction::Out)
        );
    }

    #[test]
    fn test_polygon_entry() {
        // Wide, short band: direction follows y.
        let band = CountingRegion::from_points(&[
            Point::new(20.0, 400.0),
            Point::new(1080.0, 400.0),
            Point::new(1080.0, 360.0),
            Point::new(20.0, 360.0),
        ])
        .unwrap();

        assert_eq!(
            band.crossing(Point::new(500.0, 350.0), Point::new(500.0, 380.0)),
            Some(Direction::In)
        );
        assert_eq!(
            band.crossing(Point::new(500.0, 420.0), Point::new(500.0, 390.0)),
            Some(Direction::Out)
        );
        assert_eq!(
            band.crossing(Point::new(500.0, 300.0), Point::new(500.0, 320.0)),
            None
        );
    }

    #[test]
    fn test_direction_updates_counts() {
        let mut counts = CountState::default();
        Direction::In.apply(&mut counts);
        Direction::In.apply(&mut counts);
        Direction::Out.apply(&mut counts);
        assert_eq!(
            counts,
            CountState {
                in_count: 2,
                out_count: 1
            }
        );
    }

    #[test]
    fn test_outline_closes_polygon() {
        let square = CountingRegion::from_points(&[
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ])
        .unwrap();
        let outline = square.outline();
        assert_eq!(outline.len(), 5);
        assert_eq!(outline.first(), outline.last());
        assert_eq!(vertical_line().outline().len(), 2);
    }
}
