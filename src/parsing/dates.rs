use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

// YYYY년 MM월 DD일
static RE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})\D*\s*(\d{1,2})\D*\s*(\d{1,2})").unwrap());
// YYYY년 MM월 DD일 M'M'월 D'D'일 (interval sharing the year)
static RE_DATE_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})\D*\s*(\d{1,2})\D*\s*(\d{1,2})\D*\s*(\d{1,2})\D*\s*(\d{1,2})").unwrap()
});

/// Builds a date, clamping out-of-range days instead of failing.
///
/// Filed tables occasionally carry dates like "2월 30일"; the upstream data is
/// not fixable, so the day is clamped to the end of the month (or the first of
/// the month when the day is zero) with a warning. An invalid month is
/// unrecoverable and yields `None`.
pub fn build_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
        return Some(date);
    }
    if !(1..=12).contains(&month) {
        tracing::warn!("Month must be in 1..12: {}-{}-{}", year, month, day);
        return None;
    }
    let clamped = if day == 0 {
        NaiveDate::from_ymd_opt(year, month, 1)
    } else {
        // Last day of the month
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        next.and_then(|d| d.pred_opt())
    };
    if let Some(date) = clamped {
        tracing::warn!(
            "Day {}.{}.{} is out of range for month; clamped to {}",
            year,
            month,
            day,
            date
        );
    }
    clamped
}

/// Extracts the period dates from one line of header text.
///
/// Returns one group per line: a single date for an instant header
/// (`"2018년 12월 31일 현재"`) or a start/end pair when the line carries a
/// shared-year interval (`"제21(당)기 2018년 01월 01일부터 12월 31일 까지"`).
/// Lines whose length is disproportionate to the number of date tokens are
/// prose, not headers, and are skipped.
pub fn extract_dates(text: &str) -> Option<Vec<NaiveDate>> {
    let matches: Vec<(i32, u32, u32)> = RE_DATE
        .captures_iter(text)
        .filter_map(|c| {
            Some((
                c.get(1)?.as_str().parse().ok()?,
                c.get(2)?.as_str().parse().ok()?,
                c.get(3)?.as_str().parse().ok()?,
            ))
        })
        .collect();
    if matches.is_empty() {
        return None;
    }
    if text.chars().count() > matches.len() * 80 {
        return None;
    }

    let first = matches[0];
    if let Some(pair) = RE_DATE_PAIR.captures(text) {
        let numbers: Option<Vec<u32>> = (1..=5)
            .map(|i| pair.get(i).and_then(|m| m.as_str().parse().ok()))
            .collect();
        if let Some(n) = numbers {
            // A second short month/day pair continuing the first date means a
            // single start+end period, not two instants.
            if first.1 == n[1] && first.2 == n[2] && n[3] < 13 && n[4] < 32 {
                let year = n[0] as i32;
                let dates: Vec<NaiveDate> = [
                    build_date(year, n[1], n[2]),
                    build_date(year, n[3], n[4]),
                ]
                .into_iter()
                .flatten()
                .collect();
                return if dates.is_empty() { None } else { Some(dates) };
            }
        }
    }

    let dates: Vec<NaiveDate> = matches
        .into_iter()
        .filter_map(|(y, m, d)| build_date(y, m, d))
        .collect();
    if dates.is_empty() {
        None
    } else {
        Some(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn instant_header() {
        assert_eq!(
            extract_dates("2018년 12월 31일 현재"),
            Some(vec![date(2018, 12, 31)])
        );
    }

    #[test]
    fn shared_year_interval_header() {
        assert_eq!(
            extract_dates("제21(당)기 2018년 01월 01일부터 12월 31일 까지"),
            Some(vec![date(2018, 1, 1), date(2018, 12, 31)])
        );
    }

    #[test]
    fn two_full_dates_stay_separate() {
        // The second month/day pair is a full year, not a continuation
        assert_eq!(
            extract_dates("2018년 12월 31일 2017년 12월 31일"),
            Some(vec![date(2018, 12, 31), date(2017, 12, 31)])
        );
    }

    #[test]
    fn prose_line_is_ignored() {
        let prose = "당사는 2018년 3월 2일 이사회 결의에 따라 사업을 개시하였으며, 그 이후 연결대상 종속회사의 범위에 변동이 있었고 주요 영업활동과 재무정보에 미치는 영향은 다음과 같습니다. 자세한 내용은 주석을 참조하시기 바랍니다.";
        assert_eq!(extract_dates(prose), None);
    }

    #[test]
    fn out_of_range_day_is_clamped() {
        assert_eq!(
            extract_dates("2019년 2월 30일 현재"),
            Some(vec![date(2019, 2, 28)])
        );
        assert_eq!(build_date(2019, 13, 1), None);
    }
}
