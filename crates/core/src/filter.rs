/// Tunable thresholds for the chunk quality gate. Every cutoff is a
/// named field so the heuristics can be adjusted and unit-tested
/// without touching the ingestion driver.
#[derive(Debug, Clone)]
pub struct FilterThresholds {
    pub min_chars: usize,
    pub citation_markers: Vec<String>,
    pub citation_window_chars: usize,
    pub max_citation_density: f64,
    pub max_link_markers: usize,
    pub max_doi_markers: usize,
    pub max_digit_fraction: f64,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            min_chars: 200,
            citation_markers: ["[", "vol.", "pp.", "no.", "doi:"]
                .iter()
                .map(|marker| (*marker).to_string())
                .collect(),
            citation_window_chars: 500,
            max_citation_density: 5.0,
            max_link_markers: 3,
            max_doi_markers: 3,
            max_digit_fraction: 0.30,
        }
    }
}

/// Decides whether a chunk carries enough prose to be worth embedding.
/// Pure and deterministic. Rules run in order, any match rejects:
/// too short, bibliography-dense, link/DOI dump, or mostly digits.
pub fn is_useful(text: &str, thresholds: &FilterThresholds) -> bool {
    let length = text.chars().count();
    if length < thresholds.min_chars {
        return false;
    }

    let citation_count: usize = thresholds
        .citation_markers
        .iter()
        .map(|marker| text.matches(marker.as_str()).count())
        .sum();
    let windows = length as f64 / thresholds.citation_window_chars as f64;
    if citation_count as f64 / windows > thresholds.max_citation_density {
        return false;
    }

    if text.matches("http").count() > thresholds.max_link_markers
        || text.matches("doi").count() > thresholds.max_doi_markers
    {
        return false;
    }

    let digits = text.chars().filter(char::is_ascii_digit).count();
    if digits as f64 / length as f64 > thresholds.max_digit_fraction {
        return false;
    }

    true
}
