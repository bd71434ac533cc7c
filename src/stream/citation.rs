//! 引用重建：把按字符偏移给出的引用区间合并进清洗后的答案文本
//!
//! 服务端在答案中嵌入 `<sources>` 标记，引用区间的偏移是相对于
//! 「已去掉此前各条引用标记」的文本版本给出的，因此需要累计偏移修正。

use std::sync::OnceLock;

use regex::Regex;

use super::events::CitationSpan;

/// 换行包裹的编号标记，如 "\n\n<sources>\n1\n</sources>\n\n"
const NUMBERED_MARKER: &str = r"\n\n<sources>\n\d+\n</sources>\n\n";
const REDACTED_MARKER: &str = "<sources><REDACTED></sources>";
const EMPTY_MARKER: &str = "<sources></sources>";

/// adjusted_start = start - correction - START_SHIFT
const START_SHIFT: isize = 1;
/// adjusted_end = end - correction - END_SHIFT + END_WIDEN
const END_SHIFT: isize = 2;
const END_WIDEN: isize = 4;

fn numbered_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NUMBERED_MARKER).expect("Invalid sources marker regex"))
}

/// 重建结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub text: String,
    /// 因缺少来源 URI 而放弃重建时的原因
    pub skipped: Option<String>,
}

/// 去除服务端嵌入的引用标记
pub fn strip_markers(raw: &str) -> String {
    let cleaned = numbered_marker().replace_all(raw, "");
    cleaned.replace(REDACTED_MARKER, "").replace(EMPTY_MARKER, "")
}

/// 首条引用之前已被移除的标记数量（按原文中的字符位置计）
fn markers_before(raw: &str, position: usize) -> usize {
    let byte_limit = raw
        .char_indices()
        .nth(position)
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    let numbered = numbered_marker()
        .find_iter(raw)
        .filter(|m| m.start() < byte_limit)
        .count();
    let literal = [REDACTED_MARKER, EMPTY_MARKER]
        .iter()
        .map(|marker| {
            raw.match_indices(marker)
                .filter(|(i, _)| *i < byte_limit)
                .count()
        })
        .sum::<usize>();
    numbered + literal
}

fn clamp(value: isize, len: usize) -> usize {
    value.clamp(0, len as isize) as usize
}

/// 重建带引用的答案，同时返回是否放弃
///
/// - 引用为空时原样返回 raw（不做清洗）
/// - 任一引用缺少来源 URI 时返回清洗后的文本，并在 skipped 中说明
/// - 区间按字符计算并截断到 [0, len]，start > end 时取空串
pub fn reconstruct_detailed(raw: &str, citations: &[CitationSpan]) -> Reconstruction {
    if citations.is_empty() {
        return Reconstruction {
            text: raw.to_string(),
            skipped: None,
        };
    }

    let cleaned = strip_markers(raw);
    let chars: Vec<char> = cleaned.chars().collect();
    let len = chars.len();

    let mut correction = markers_before(raw, citations[0].start) as isize;
    let mut cited = String::new();

    for (idx, citation) in citations.iter().enumerate() {
        let uri = match citation.source_uri.as_deref() {
            Some(uri) if !uri.is_empty() => uri,
            _ => {
                return Reconstruction {
                    text: cleaned,
                    skipped: Some(format!("citation {} has no source uri", idx + 1)),
                };
            }
        };

        // 每条引用后面跟着一个被清洗掉的标记，后续区间整体左移
        let start = clamp(citation.start as isize - correction - START_SHIFT, len);
        let end = clamp(
            citation.end as isize - correction - END_SHIFT + END_WIDEN,
            len,
        );

        if idx == 0 {
            cited.extend(&chars[..start]);
        }
        if start < end {
            cited.extend(&chars[start..end]);
        }
        cited.push_str(" [");
        cited.push_str(uri);
        cited.push_str("] ");

        correction += 1;
    }

    Reconstruction {
        text: cited,
        skipped: None,
    }
}

/// 重建带引用的答案
pub fn reconstruct(raw: &str, citations: &[CitationSpan]) -> String {
    reconstruct_detailed(raw, citations).text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_citations_is_identity() {
        let raw = "Plain answer.<sources></sources>";
        assert_eq!(reconstruct(raw, &[]), raw);
    }

    #[test]
    fn test_strip_markers() {
        let raw = "A.\n\n<sources>\n3\n</sources>\n\nB.<sources><REDACTED></sources>C.<sources></sources>";
        assert_eq!(strip_markers(raw), "A.B.C.");
    }

    #[test]
    fn test_single_numbered_marker() {
        let raw = "Revenue grew 12% in 2023.\n\n<sources>\n1\n</sources>\n\nMargins were stable.";
        let citations = vec![CitationSpan::new(1, 23, "s3://reports/annual.pdf")];
        assert_eq!(
            reconstruct(raw, &citations),
            "Revenue grew 12% in 2023. [s3://reports/annual.pdf] "
        );
    }

    #[test]
    fn test_two_inline_markers() {
        let raw = "Solar output peaks in June.<sources><REDACTED></sources> Demand peaks in August.<sources></sources>";
        let citations = vec![
            CitationSpan::new(1, 25, "s3://energy/solar.csv"),
            CitationSpan::new(29, 50, "s3://energy/demand.csv"),
        ];
        assert_eq!(
            reconstruct(raw, &citations),
            "Solar output peaks in June. [s3://energy/solar.csv]  Demand peaks in August. [s3://energy/demand.csv] "
        );
    }

    #[test]
    fn test_three_citations_with_prefix() {
        let raw = "Intro. Alpha fact.\n\n<sources>\n1\n</sources>\n\n Beta fact.\n\n<sources>\n2\n</sources>\n\n Gamma fact.";
        let citations = vec![
            CitationSpan::new(8, 16, "s3://kb/a.md"),
            CitationSpan::new(20, 28, "s3://kb/b.md"),
            CitationSpan::new(32, 41, "s3://kb/c.md"),
        ];
        assert_eq!(
            reconstruct(raw, &citations),
            "Intro. Alpha fact. [s3://kb/a.md]  Beta fact. [s3://kb/b.md]  Gamma fact. [s3://kb/c.md] "
        );
    }

    #[test]
    fn test_offsets_clamped_to_text() {
        let citations = vec![CitationSpan::new(0, 3, "s3://x")];
        assert_eq!(reconstruct("Short.", &citations), "Short [s3://x] ");
    }

    #[test]
    fn test_offsets_count_chars_not_bytes() {
        let raw = "Ünïcödé sentence.<sources></sources>";
        let citations = vec![CitationSpan::new(1, 15, "s3://u")];
        assert_eq!(reconstruct(raw, &citations), "Ünïcödé sentence. [s3://u] ");
    }

    #[test]
    fn test_missing_uri_falls_back_to_cleaned_text() {
        let citations = vec![CitationSpan {
            start: 1,
            end: 5,
            source_uri: None,
        }];
        let result = reconstruct_detailed("Uncited.<sources></sources>", &citations);
        assert_eq!(result.text, "Uncited.");
        assert!(result.skipped.is_some());
    }

    #[test]
    fn test_deterministic() {
        let raw = "Revenue grew 12% in 2023.\n\n<sources>\n1\n</sources>\n\n";
        let citations = vec![CitationSpan::new(1, 23, "s3://r")];
        assert_eq!(reconstruct(raw, &citations), reconstruct(raw, &citations));
    }
}
