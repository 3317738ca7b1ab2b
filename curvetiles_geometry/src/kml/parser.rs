use super::KmlRoad;
use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;

/// What the current text content belongs to.
#[derive(Clone, Copy, Eq, PartialEq)]
enum TextTarget {
	None,
	FolderName,
	Description,
	LineCoordinates,
	PolygonCoordinates,
}

struct RoadBuilder {
	name: String,
	coordinates: Vec<[f64; 2]>,
	curvature: Option<String>,
}

/// Parses a KML document into one road per top-level `Folder`.
///
/// Sub-folders fold into their root folder: their placemarks contribute to
/// the same road, and their names are ignored. A placemark's geometry is
/// taken from `LineString/coordinates`, falling back to
/// `Polygon/outerBoundaryIs/LinearRing/coordinates` when the line string is
/// absent or yields no valid coordinate. Coordinate triples that fail to
/// parse as two floats are skipped individually.
pub fn parse_kml(xml: &str) -> Result<Vec<KmlRoad>> {
	let curvature_pattern = Regex::new(r"c_(\d+)|curvature:\s*(\d+)").unwrap();

	let mut reader = Reader::from_str(xml);

	let mut roads: Vec<KmlRoad> = Vec::new();
	let mut stack: Vec<String> = Vec::new();
	let mut folder_depth = 0usize;
	let mut in_placemark = false;

	let mut current: Option<RoadBuilder> = None;
	let mut target = TextTarget::None;
	let mut text = String::new();
	let mut line_text = String::new();
	let mut polygon_text = String::new();

	loop {
		match reader.read_event().context("malformed KML")? {
			Event::Start(element) => {
				let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
				target = start_element(
					&name,
					&stack,
					&mut folder_depth,
					&mut in_placemark,
					&mut current,
					&mut line_text,
					&mut polygon_text,
				);
				text.clear();
				stack.push(name);
			}
			Event::Empty(_) => {
				// Self-closing elements carry no text or children.
			}
			Event::Text(content) => {
				if target != TextTarget::None {
					text.push_str(&content.unescape().context("invalid text content")?);
				}
			}
			Event::CData(content) => {
				if target != TextTarget::None {
					text.push_str(&String::from_utf8_lossy(&content.into_inner()));
				}
			}
			Event::End(element) => {
				let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
				stack.pop();
				end_element(
					&name,
					&mut folder_depth,
					&mut in_placemark,
					&mut current,
					&mut roads,
					target,
					&text,
					&mut line_text,
					&mut polygon_text,
					&curvature_pattern,
				);
				target = TextTarget::None;
				text.clear();
			}
			Event::Eof => break,
			_ => {}
		}
	}

	Ok(roads)
}

#[allow(clippy::too_many_arguments)]
fn start_element(
	name: &str,
	stack: &[String],
	folder_depth: &mut usize,
	in_placemark: &mut bool,
	current: &mut Option<RoadBuilder>,
	line_text: &mut String,
	polygon_text: &mut String,
) -> TextTarget {
	let parent = stack.last().map(String::as_str);
	match name {
		"Folder" => {
			*folder_depth += 1;
			if *folder_depth == 1 {
				*current = Some(RoadBuilder {
					name: String::new(),
					coordinates: Vec::new(),
					curvature: None,
				});
			}
			TextTarget::None
		}
		"Placemark" if *folder_depth >= 1 => {
			*in_placemark = true;
			line_text.clear();
			polygon_text.clear();
			TextTarget::None
		}
		"name" if parent == Some("Folder") && *folder_depth == 1 && !*in_placemark => {
			match current {
				Some(road) if road.name.is_empty() => TextTarget::FolderName,
				_ => TextTarget::None,
			}
		}
		"description" if *folder_depth >= 1 && (*in_placemark || parent == Some("Folder")) => TextTarget::Description,
		"coordinates" if *in_placemark => {
			if parent == Some("LineString") {
				TextTarget::LineCoordinates
			} else if parent == Some("LinearRing") && stack.iter().any(|e| e == "outerBoundaryIs") {
				TextTarget::PolygonCoordinates
			} else {
				TextTarget::None
			}
		}
		_ => TextTarget::None,
	}
}

#[allow(clippy::too_many_arguments)]
fn end_element(
	name: &str,
	folder_depth: &mut usize,
	in_placemark: &mut bool,
	current: &mut Option<RoadBuilder>,
	roads: &mut Vec<KmlRoad>,
	target: TextTarget,
	text: &str,
	line_text: &mut String,
	polygon_text: &mut String,
	curvature_pattern: &Regex,
) {
	match name {
		"name" => {
			if target == TextTarget::FolderName {
				if let Some(road) = current {
					road.name = text.trim().to_string();
				}
			}
		}
		"description" => {
			if target == TextTarget::Description {
				if let Some(road) = current {
					if road.curvature.is_none() {
						road.curvature = extract_curvature(text, curvature_pattern);
					}
				}
			}
		}
		"coordinates" => match target {
			TextTarget::LineCoordinates => line_text.push_str(text),
			TextTarget::PolygonCoordinates => polygon_text.push_str(text),
			_ => {}
		},
		"Placemark" => {
			*in_placemark = false;
			if let Some(road) = current {
				let mut points = Vec::new();
				let line_points = parse_coordinates(line_text, &mut points);
				if !line_text.trim().is_empty() && !polygon_text.trim().is_empty() {
					log::warn!("placemark carries both LineString and Polygon geometry; using the LineString");
				}
				if line_points == 0 {
					parse_coordinates(polygon_text, &mut points);
				}
				road.coordinates.append(&mut points);
			}
			line_text.clear();
			polygon_text.clear();
		}
		"Folder" => {
			*folder_depth = folder_depth.saturating_sub(1);
			if *folder_depth == 0 {
				if let Some(road) = current.take() {
					if road.coordinates.is_empty() {
						log::debug!("folder {:?} has no valid coordinates, skipping", road.name);
					} else {
						roads.push(KmlRoad {
							name: road.name,
							coordinates: road.coordinates,
							curvature: road.curvature,
						});
					}
				}
			}
		}
		_ => {}
	}
}

/// Appends every parseable `lng,lat[,elev]` triple to `out`, returning how
/// many were appended. Unparseable points are skipped one by one.
fn parse_coordinates(text: &str, out: &mut Vec<[f64; 2]>) -> usize {
	let before = out.len();
	for token in text.split_whitespace() {
		let mut parts = token.split(',');
		let (Some(lng), Some(lat)) = (parts.next(), parts.next()) else {
			continue;
		};
		let (Ok(lng), Ok(lat)) = (lng.parse::<f64>(), lat.parse::<f64>()) else {
			continue;
		};
		out.push([lng, lat]);
	}
	out.len() - before
}

fn extract_curvature(description: &str, pattern: &Regex) -> Option<String> {
	let captures = pattern.captures(description)?;
	captures
		.get(1)
		.or_else(|| captures.get(2))
		.map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn kml(body: &str) -> String {
		format!(
			r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>{body}</Document></kml>"#
		)
	}

	#[test]
	fn one_road_per_folder_with_segments_merged() {
		let xml = kml(
			r"<Folder><name>NF-73</name>
				<Placemark><LineString><coordinates>-122.1,45.1,10 -122.2,45.2</coordinates></LineString></Placemark>
				<Placemark><LineString><coordinates>-122.3,45.3</coordinates></LineString></Placemark>
			</Folder>
			<Folder><name>Rock Creek Rd</name>
				<Placemark><LineString><coordinates>-121.0,44.0</coordinates></LineString></Placemark>
			</Folder>",
		);
		let roads = parse_kml(&xml).unwrap();
		assert_eq!(roads.len(), 2);
		assert_eq!(roads[0].name, "NF-73");
		assert_eq!(
			roads[0].coordinates,
			vec![[-122.1, 45.1], [-122.2, 45.2], [-122.3, 45.3]]
		);
		assert_eq!(roads[1].name, "Rock Creek Rd");
	}

	#[test]
	fn nested_folders_fold_into_the_root_feature() {
		let xml = kml(
			r"<Folder><name>Outer</name>
				<Placemark><LineString><coordinates>1.0,2.0</coordinates></LineString></Placemark>
				<Folder><name>Inner</name>
					<Placemark><LineString><coordinates>3.0,4.0</coordinates></LineString></Placemark>
				</Folder>
			</Folder>",
		);
		let roads = parse_kml(&xml).unwrap();
		assert_eq!(roads.len(), 1);
		assert_eq!(roads[0].name, "Outer");
		assert_eq!(roads[0].coordinates, vec![[1.0, 2.0], [3.0, 4.0]]);
	}

	#[test]
	fn polygon_fallback_when_no_line_string() {
		let xml = kml(
			r"<Folder><name>Loop</name>
				<Placemark><Polygon><outerBoundaryIs><LinearRing>
					<coordinates>10.0,20.0 10.1,20.1 10.0,20.0</coordinates>
				</LinearRing></outerBoundaryIs></Polygon></Placemark>
			</Folder>",
		);
		let roads = parse_kml(&xml).unwrap();
		assert_eq!(roads[0].coordinates.len(), 3);
	}

	#[test]
	fn line_string_wins_over_polygon_sibling() {
		let xml = kml(
			r"<Folder><name>Both</name>
				<Placemark>
					<LineString><coordinates>1.0,1.0 2.0,2.0</coordinates></LineString>
					<Polygon><outerBoundaryIs><LinearRing>
						<coordinates>9.0,9.0 9.1,9.1 9.0,9.0</coordinates>
					</LinearRing></outerBoundaryIs></Polygon>
				</Placemark>
			</Folder>",
		);
		let roads = parse_kml(&xml).unwrap();
		assert_eq!(roads[0].coordinates, vec![[1.0, 1.0], [2.0, 2.0]]);
	}

	#[test]
	fn inner_boundary_is_ignored() {
		let xml = kml(
			r"<Folder><name>Ring</name>
				<Placemark><Polygon>
					<outerBoundaryIs><LinearRing><coordinates>1.0,1.0 2.0,2.0</coordinates></LinearRing></outerBoundaryIs>
					<innerBoundaryIs><LinearRing><coordinates>8.0,8.0</coordinates></LinearRing></innerBoundaryIs>
				</Polygon></Placemark>
			</Folder>",
		);
		let roads = parse_kml(&xml).unwrap();
		assert_eq!(roads[0].coordinates, vec![[1.0, 1.0], [2.0, 2.0]]);
	}

	#[test]
	fn unparseable_points_are_skipped_individually() {
		let xml = kml(
			r"<Folder><name>Gappy</name>
				<Placemark><LineString><coordinates>1.0,2.0 broken not,anumber 3.0,4.0</coordinates></LineString></Placemark>
			</Folder>",
		);
		let roads = parse_kml(&xml).unwrap();
		assert_eq!(roads[0].coordinates, vec![[1.0, 2.0], [3.0, 4.0]]);
	}

	#[test]
	fn folder_with_no_valid_coordinates_contributes_nothing() {
		let xml = kml(
			r"<Folder><name>Empty</name>
				<Placemark><LineString><coordinates>garbage</coordinates></LineString></Placemark>
			</Folder>",
		);
		assert!(parse_kml(&xml).unwrap().is_empty());
	}

	#[rstest::rstest]
	#[case("score is c_1445 overall", Some("1445"))]
	#[case("curvature: 892", Some("892"))]
	#[case("curvature:77", Some("77"))]
	#[case("c_12 then curvature: 99", Some("12"))]
	#[case("nothing here", None)]
	fn curvature_extraction(#[case] description: &str, #[case] expected: Option<&str>) {
		let xml = kml(&format!(
			r"<Folder><name>R</name><description>{description}</description>
				<Placemark><LineString><coordinates>1.0,2.0</coordinates></LineString></Placemark>
			</Folder>"
		));
		let roads = parse_kml(&xml).unwrap();
		assert_eq!(roads[0].curvature.as_deref(), expected);
	}

	#[test]
	fn curvature_from_cdata_description() {
		let xml = kml(
			r"<Folder><name>R</name>
				<Placemark>
					<description><![CDATA[<b>curvy!</b> c_3021]]></description>
					<LineString><coordinates>1.0,2.0</coordinates></LineString>
				</Placemark>
			</Folder>",
		);
		let roads = parse_kml(&xml).unwrap();
		assert_eq!(roads[0].curvature.as_deref(), Some("3021"));
	}

	#[test]
	fn placemark_name_does_not_override_folder_name() {
		let xml = kml(
			r"<Folder><name>Road</name>
				<Placemark><name>Segment 1</name><LineString><coordinates>1.0,2.0</coordinates></LineString></Placemark>
			</Folder>",
		);
		let roads = parse_kml(&xml).unwrap();
		assert_eq!(roads[0].name, "Road");
	}

	#[test]
	fn coordinate_count_is_preserved() {
		// The invariant driving downstream verification: output coordinate
		// count equals the number of valid source triples.
		let xml = kml(
			r"<Folder><name>A</name>
				<Placemark><LineString><coordinates>1,1 2,2 3,3</coordinates></LineString></Placemark>
				<Placemark><LineString><coordinates>4,4 5,5</coordinates></LineString></Placemark>
			</Folder>
			<Folder><name>B</name>
				<Placemark><LineString><coordinates>6,6</coordinates></LineString></Placemark>
			</Folder>",
		);
		let roads = parse_kml(&xml).unwrap();
		let total: usize = roads.iter().map(|r| r.coordinates.len()).sum();
		assert_eq!(total, 6);
	}
}
