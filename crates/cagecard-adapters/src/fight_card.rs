//! Fight-card extraction: a small segment state machine over table rows plus
//! the shared assembly step that turns raw bouts into ordered [`Fight`]s.

use cagecard_core::{CardOrder, Fight, Fighter, FighterRecord, Segment, TitleFight};
use tracing::{debug, warn};

use crate::fighters::FighterRegistry;
use crate::text::{
    champion_marker, clean_fighter_name, parse_bout_text, parse_round, title_from_weight_class,
};

/// One table row as cell texts, markers included.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CardRow {
    pub cells: Vec<String>,
}

impl CardRow {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(|c| c.trim()).filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardState {
    #[default]
    AwaitingSegment,
    InSegment(Segment),
}

impl CardState {
    /// Segment assigned to a bout row seen in this state.
    pub fn segment(&self) -> Segment {
        match self {
            CardState::AwaitingSegment => Segment::MainCard,
            CardState::InSegment(segment) => *segment,
        }
    }

    /// Transition on a single-cell header row; unknown headers keep the current state.
    pub fn on_header(self, text: &str) -> Self {
        classify_segment_header(text).map_or(self, CardState::InSegment)
    }
}

pub fn classify_segment_header(text: &str) -> Option<Segment> {
    let lower = text.to_lowercase();
    if lower.contains("main card") {
        Some(Segment::MainCard)
    } else if lower.contains("prelim") || lower.contains("preliminary") {
        if lower.contains("early") {
            Some(Segment::EarlyPrelims)
        } else {
            Some(Segment::Prelims)
        }
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub weight_class: usize,
    pub fighter1: usize,
    pub outcome: Option<usize>,
    /// Set when the header labels the first fighter column "Winner".
    pub winner_first: bool,
    pub fighter2: usize,
    pub method: usize,
    pub round: usize,
    pub time: usize,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            weight_class: 0,
            fighter1: 1,
            outcome: Some(2),
            winner_first: false,
            fighter2: 3,
            method: 4,
            round: 5,
            time: 6,
        }
    }
}

impl ColumnMap {
    /// Remaps columns from labelled header cells; blank labels keep their defaults.
    pub fn from_header(cells: &[String]) -> Self {
        let mut map = Self::default();
        for (index, label) in cells.iter().enumerate() {
            match label.trim().to_lowercase().as_str() {
                "weight class" | "division" => map.weight_class = index,
                "fighter 1" | "fighter" => map.fighter1 = index,
                "winner" => {
                    map.fighter1 = index;
                    map.winner_first = true;
                }
                "fighter 2" | "opponent" | "loser" => map.fighter2 = index,
                "method" => map.method = index,
                "round" | "rd." | "rnd" => map.round = index,
                "time" => map.time = index,
                _ => {}
            }
        }
        map.outcome = (map.fighter2 == map.fighter1 + 2).then_some(map.fighter1 + 1);
        map
    }

    fn required_width(&self) -> usize {
        self.weight_class.max(self.fighter1).max(self.fighter2) + 1
    }
}

fn is_column_header(first_cell: &str) -> bool {
    let lower = first_cell.trim().to_lowercase();
    lower.contains("weight class") || lower == "division"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    #[default]
    Pending,
    Fighter1Won,
    Fighter2Won,
    NoWinner,
}

impl Outcome {
    /// Reads the middle cell of a bout row ("def.", "vs.", "drew", "no contest").
    pub fn from_marker(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("no contest") || lower.contains("drew") || lower.contains("draw") {
            Outcome::NoWinner
        } else if lower.contains("def") {
            Outcome::Fighter1Won
        } else {
            Outcome::Pending
        }
    }

    /// Winner/Loser tables only list finished bouts; a recorded method settles the result.
    pub fn from_winner_column(method: Option<&str>) -> Self {
        let Some(method) = method else {
            return Outcome::Pending;
        };
        let lower = method.to_lowercase();
        if lower.contains("draw") || lower.contains("no contest") || lower.starts_with("nc") {
            Outcome::NoWinner
        } else {
            Outcome::Fighter1Won
        }
    }
}

/// A fighter as written by the source, before cleanup and registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Corner {
    pub raw_name: String,
    pub record: Option<String>,
    pub country: Option<String>,
}

impl Corner {
    pub fn named(raw_name: impl Into<String>) -> Self {
        Self {
            raw_name: raw_name.into(),
            ..Self::default()
        }
    }
}

/// One bout in source document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoutDraft {
    pub fighter1: Corner,
    pub fighter2: Corner,
    pub weight_class: String,
    pub segment: Segment,
    pub outcome: Outcome,
    pub method: Option<String>,
    pub round: Option<String>,
    pub time: Option<String>,
    /// Title flag from explicit markup (belt icon, API flag), if the source has one.
    pub title: Option<TitleFight>,
}

impl BoutDraft {
    pub fn from_text(text: &str, segment: Segment) -> Option<Self> {
        let bout = parse_bout_text(text)?;
        Some(Self {
            fighter1: Corner::named(bout.fighter1),
            fighter2: Corner::named(bout.fighter2),
            weight_class: "Unknown".to_string(),
            segment,
            outcome: if bout.fighter1_won {
                Outcome::Fighter1Won
            } else {
                Outcome::Pending
            },
            method: bout.method,
            ..Self::default()
        })
    }
}

/// Runs the segment state machine over table rows.
pub fn extract_card(rows: &[CardRow]) -> Vec<BoutDraft> {
    let mut state = CardState::default();
    let mut columns = ColumnMap::default();
    let mut drafts = Vec::new();

    for row in rows {
        match row.cells.len() {
            0 => continue,
            1 => {
                let next = state.on_header(&row.cells[0]);
                if next != state {
                    debug!(segment = next.segment().as_str(), "entering card segment");
                }
                state = next;
            }
            _ => {
                if is_column_header(&row.cells[0]) {
                    columns = ColumnMap::from_header(&row.cells);
                    continue;
                }
                match parse_bout_row(row, &columns, state.segment()) {
                    Some(draft) => drafts.push(draft),
                    None => warn!(cells = ?row.cells, "skipping malformed bout row"),
                }
            }
        }
    }
    drafts
}

fn parse_bout_row(row: &CardRow, columns: &ColumnMap, segment: Segment) -> Option<BoutDraft> {
    if row.cells.len() < columns.required_width().max(4) {
        return None;
    }
    let fighter1 = row.cell(columns.fighter1)?;
    let fighter2 = row.cell(columns.fighter2)?;
    let method = row.cell(columns.method);
    let outcome = match columns.outcome.and_then(|index| row.cell(index)) {
        Some(marker) => Outcome::from_marker(marker),
        None if columns.winner_first => Outcome::from_winner_column(method),
        None => Outcome::Pending,
    };

    Some(BoutDraft {
        fighter1: Corner::named(fighter1),
        fighter2: Corner::named(fighter2),
        weight_class: row.cell(columns.weight_class).unwrap_or("Unknown").to_string(),
        segment,
        outcome,
        method: method.map(str::to_string),
        round: row.cell(columns.round).map(str::to_string),
        time: row.cell(columns.time).map(str::to_string),
        title: None,
    })
}

fn build_fighter(
    corner: &Corner,
    registry: Option<&FighterRegistry>,
) -> Option<(Fighter, Option<TitleFight>)> {
    let marker = champion_marker(&corner.raw_name);
    let name = clean_fighter_name(&corner.raw_name);
    if name.is_empty() {
        return None;
    }

    let mut fighter = Fighter::named(name);
    fighter.is_champion = marker.is_some();
    fighter.country = corner.country.clone();

    if let Some(record) = corner.record.as_deref() {
        match record.parse::<FighterRecord>() {
            Ok(parsed) => fighter.set_record(parsed),
            Err(_) => fighter.record = Some(record.trim().to_string()),
        }
    }

    if let Some(known) = registry.and_then(|r| r.lookup(&fighter.name)) {
        if fighter.record_breakdown.is_none() {
            if let Some(record) = known.record_breakdown {
                fighter.set_record(record);
            }
        }
        fighter.country = fighter.country.take().or_else(|| known.country.clone());
        fighter.nickname = known.nickname.clone();
        fighter.age = known.age;
    }
    Some((fighter, marker))
}

/// Numbers fights 1..N so that 1 is the main event.
pub fn assign_bout_order(fights: &mut [Fight], order: CardOrder) {
    if order == CardOrder::MainEventLast {
        fights.reverse();
    }
    for (index, fight) in fights.iter_mut().enumerate() {
        fight.bout_order = index as u32 + 1;
    }
}

/// Turns drafts into validated fights with derived titles, winners, records and bout order.
pub fn assemble_card(
    drafts: Vec<BoutDraft>,
    order: CardOrder,
    registry: Option<&FighterRegistry>,
) -> Vec<Fight> {
    let mut fights = Vec::with_capacity(drafts.len());

    for draft in drafts {
        let (Some((fighter1, marker1)), Some((fighter2, marker2))) = (
            build_fighter(&draft.fighter1, registry),
            build_fighter(&draft.fighter2, registry),
        ) else {
            warn!(
                fighter1 = %draft.fighter1.raw_name,
                fighter2 = %draft.fighter2.raw_name,
                "skipping bout without two named fighters"
            );
            continue;
        };

        let title = draft
            .title
            .filter(TitleFight::is_title)
            .or_else(|| {
                [marker1, marker2]
                    .into_iter()
                    .flatten()
                    .max_by_key(|t| matches!(t, TitleFight::Interim))
            })
            .unwrap_or_else(|| title_from_weight_class(&draft.weight_class));

        let winner = match draft.outcome {
            Outcome::Fighter1Won => Some(fighter1.name.clone()),
            Outcome::Fighter2Won => Some(fighter2.name.clone()),
            Outcome::Pending | Outcome::NoWinner => None,
        };

        let mut fight = Fight::new(fighter1, fighter2, draft.weight_class);
        fight.title_fight = title;
        fight.segment = draft.segment;
        fight.method = draft.method;
        fight.round = draft.round.as_deref().and_then(parse_round);
        fight.time = draft.time;
        fight.winner = winner;
        fight.settle_result();
        fights.push(fight);
    }

    assign_bout_order(&mut fights, order);
    fights
}

/// Bonus award winners keyed by award label.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BonusAwards {
    pub fight_of_the_night: Vec<String>,
    pub performance_of_the_night: Vec<String>,
}

pub const FIGHT_OF_THE_NIGHT: &str = "Fight of the Night";
pub const PERFORMANCE_OF_THE_NIGHT: &str = "Performance of the Night";

impl BonusAwards {
    /// Reads "Fight of the Night: A vs. B" and "Performance of the Night: A, B" lines.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut awards = Self::default();
        for line in lines {
            let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
            if let Some(rest) = strip_label(&line, FIGHT_OF_THE_NIGHT) {
                awards
                    .fight_of_the_night
                    .extend(split_names(rest, &[" vs. ", " vs "]));
            } else if let Some(rest) = strip_label(&line, PERFORMANCE_OF_THE_NIGHT) {
                awards
                    .performance_of_the_night
                    .extend(split_names(rest, &[",", " and "]));
            }
        }
        awards
    }

    pub fn is_empty(&self) -> bool {
        self.fight_of_the_night.is_empty() && self.performance_of_the_night.is_empty()
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let index = line.to_ascii_lowercase().find(&label.to_ascii_lowercase())?;
    let rest = &line[index + label.len()..];
    Some(rest.trim_start_matches([':', ' ']))
}

fn split_names(text: &str, separators: &[&str]) -> Vec<String> {
    let mut parts = vec![text.to_string()];
    for separator in separators {
        parts = parts
            .iter()
            .flat_map(|part| part.split(separator).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }
    parts
        .into_iter()
        .map(|name| clean_fighter_name(&name))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Attaches bonus labels to matching fighters and collects them per fight.
pub fn apply_bonuses(fights: &mut [Fight], awards: &BonusAwards) {
    let awarded = |list: &[String], name: &str| list.iter().any(|n| n.eq_ignore_ascii_case(name));

    for fight in fights.iter_mut() {
        let mut labels = Vec::new();

        if awarded(&awards.fight_of_the_night, &fight.fighter1.name)
            && awarded(&awards.fight_of_the_night, &fight.fighter2.name)
        {
            fight.fighter1.bonus = Some(FIGHT_OF_THE_NIGHT.to_string());
            fight.fighter2.bonus = Some(FIGHT_OF_THE_NIGHT.to_string());
            labels.push(FIGHT_OF_THE_NIGHT.to_string());
        }
        for fighter in [&mut fight.fighter1, &mut fight.fighter2] {
            if awarded(&awards.performance_of_the_night, &fighter.name) {
                fighter.bonus = Some(PERFORMANCE_OF_THE_NIGHT.to_string());
                labels.push(format!("{PERFORMANCE_OF_THE_NIGHT}: {}", fighter.name));
            }
        }

        if !labels.is_empty() {
            fight.bonuses = Some(labels);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(text: &str) -> CardRow {
        CardRow::new([text])
    }

    fn bout(weight: &str, a: &str, marker: &str, b: &str, method: &str) -> CardRow {
        CardRow::new([weight, a, marker, b, method, "1", "4:52", ""])
    }

    fn column_header() -> CardRow {
        CardRow::new(["Weight class", "", "", "", "Method", "Round", "Time", "Notes"])
    }

    #[test]
    fn segments_follow_header_rows() {
        let rows = vec![
            header("Main card"),
            column_header(),
            bout("Light Heavyweight", "Alex Pereira (c)", "def.", "Jamahal Hill", "KO (punches)"),
            bout("Women's Strawweight", "Zhang Weili", "def.", "Yan Xiaonan", "Decision (unanimous)"),
            header("Preliminary card (ESPN2 / ESPN+)"),
            column_header(),
            bout("Lightweight", "Jalin Turner", "def.", "Renato Moicano", "Submission"),
        ];

        let fights = assemble_card(extract_card(&rows), CardOrder::MainEventFirst, None);
        let segments: Vec<_> = fights.iter().map(|f| f.segment).collect();
        assert_eq!(segments, [Segment::MainCard, Segment::MainCard, Segment::Prelims]);
        let orders: Vec<_> = fights.iter().map(|f| f.bout_order).collect();
        assert_eq!(orders, [1, 2, 3]);

        assert_eq!(fights[0].title_fight, TitleFight::Undisputed);
        assert!(fights[0].fighter1.is_champion);
        assert_eq!(fights[0].fighter1.name, "Alex Pereira");
        assert_eq!(fights[1].title_fight, TitleFight::None);
    }

    #[test]
    fn main_event_last_reverses_document_order() {
        let rows = vec![
            header("Early preliminary card"),
            bout("Flyweight", "E", "vs.", "F", ""),
            header("Main card"),
            bout("Heavyweight", "A (c)", "vs.", "B", ""),
        ];
        let fights = assemble_card(extract_card(&rows), CardOrder::MainEventLast, None);
        assert_eq!(fights[0].bout_order, 1);
        assert_eq!(fights[0].fighter1.name, "A");
        assert_eq!(fights[0].segment, Segment::MainCard);
        assert_eq!(fights[1].segment, Segment::EarlyPrelims);
        assert_eq!(fights[1].bout_order, 2);
    }

    #[test]
    fn rows_before_any_header_default_to_main_card() {
        let rows = vec![bout("Bantamweight", "Sean O'Malley", "vs.", "Merab Dvalishvili", "")];
        let drafts = extract_card(&rows);
        assert_eq!(drafts[0].segment, Segment::MainCard);
    }

    #[test]
    fn pending_bouts_have_no_winner_or_method() {
        let rows = vec![bout("Featherweight", "Ilia Topuria (c)", "vs.", "Max Holloway", "")];
        let fights = assemble_card(extract_card(&rows), CardOrder::MainEventLast, None);
        assert_eq!(fights[0].winner, None);
        assert_eq!(fights[0].method, None);
    }

    #[test]
    fn def_marker_with_method_names_fighter1_winner() {
        let rows = vec![bout("Featherweight", "Ilia Topuria (c)", "def.", "Max Holloway", "KO (punch)")];
        let fights = assemble_card(extract_card(&rows), CardOrder::MainEventLast, None);
        assert_eq!(fights[0].winner.as_deref(), Some("Ilia Topuria"));
        assert_eq!(fights[0].round, Some(1));
        assert_eq!(fights[0].time.as_deref(), Some("4:52"));
    }

    #[test]
    fn winner_loser_columns_name_the_winner() {
        let rows = vec![
            header("Main card"),
            CardRow::new(["Weight class", "Winner", "Loser", "Method", "Round", "Time"]),
            CardRow::new(["Middleweight", "Dricus du Plessis (c)", "Sean Strickland", "Decision (split)", "5", "5:00"]),
            CardRow::new(["Welterweight", "Belal Muhammad", "Gilbert Burns", "No Contest (eye poke)", "1", "2:08"]),
            CardRow::new(["Lightweight", "Renato Moicano", "Benoit Saint Denis", "", "", ""]),
        ];

        let drafts = extract_card(&rows);
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].outcome, Outcome::Fighter1Won);
        assert_eq!(drafts[0].fighter2.raw_name, "Sean Strickland");
        assert_eq!(drafts[1].outcome, Outcome::NoWinner);
        assert_eq!(drafts[2].outcome, Outcome::Pending);

        let fights = assemble_card(drafts, CardOrder::MainEventFirst, None);
        assert_eq!(fights[0].winner.as_deref(), Some("Dricus du Plessis"));
        assert_eq!(fights[0].method.as_deref(), Some("Decision (split)"));
        assert_eq!(fights[1].winner, None);
        assert_eq!(fights[2].winner, None);
    }

    #[test]
    fn draws_and_interim_markers() {
        let rows = vec![
            bout("Lightweight", "Justin Gaethje", "drew", "Rafael Fiziev", "Decision (majority)"),
            bout("Featherweight", "Max Holloway (ic)", "def.", "Brian Ortega", "Decision"),
            bout("Interim Bantamweight Championship", "A", "vs.", "B", ""),
        ];
        let fights = assemble_card(extract_card(&rows), CardOrder::MainEventFirst, None);
        assert_eq!(fights[0].winner, None);
        assert_eq!(fights[0].method.as_deref(), Some("Decision (majority)"));
        assert_eq!(fights[1].title_fight, TitleFight::Interim);
        assert_eq!(fights[2].title_fight, TitleFight::Interim);
    }

    #[test]
    fn header_labels_remap_columns() {
        let rows = vec![
            CardRow::new(["Weight class", "Winner", "Loser", "Method", "Round", "Time"]),
            CardRow::new(["Middleweight", "Dricus du Plessis", "Sean Strickland", "Decision", "5", "5:00"]),
        ];
        let drafts = extract_card(&rows);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].fighter2.raw_name, "Sean Strickland");
        assert_eq!(drafts[0].method.as_deref(), Some("Decision"));
        assert_eq!(drafts[0].round.as_deref(), Some("5"));
        assert_eq!(drafts[0].outcome, Outcome::Pending);
    }

    #[test]
    fn short_rows_are_skipped() {
        let rows = vec![
            CardRow::new(["Heavyweight", "Tom Aspinall"]),
            bout("Heavyweight", "A", "vs.", "B", ""),
        ];
        assert_eq!(extract_card(&rows).len(), 1);
    }

    #[test]
    fn bonuses_attach_to_fighters() {
        let rows = vec![
            bout("Lightweight", "Max Holloway", "def.", "Justin Gaethje", "KO"),
            bout("Light Heavyweight", "Alex Pereira (c)", "def.", "Jamahal Hill", "KO"),
        ];
        let mut fights = assemble_card(extract_card(&rows), CardOrder::MainEventFirst, None);
        let awards = BonusAwards::from_lines([
            "Fight of the Night: Max Holloway vs. Justin Gaethje",
            "Performance of the Night: Alex Pereira , Max Holloway",
        ]);
        apply_bonuses(&mut fights, &awards);

        assert_eq!(fights[0].fighter1.bonus.as_deref(), Some(PERFORMANCE_OF_THE_NIGHT));
        assert_eq!(fights[0].fighter2.bonus.as_deref(), Some(FIGHT_OF_THE_NIGHT));
        assert_eq!(fights[0].bonuses.as_ref().map(Vec::len), Some(2));
        assert_eq!(fights[1].fighter1.bonus.as_deref(), Some(PERFORMANCE_OF_THE_NIGHT));
        assert_eq!(fights[1].fighter2.bonus, None);
    }

    #[test]
    fn text_drafts_feed_the_same_assembly() {
        let drafts = vec![
            BoutDraft::from_text("Jon Jones def. Ciryl Gane via submission", Segment::MainCard).unwrap(),
        ];
        let fights = assemble_card(drafts, CardOrder::MainEventLast, None);
        assert_eq!(fights[0].winner.as_deref(), Some("Jon Jones"));
        assert_eq!(fights[0].method.as_deref(), Some("submission"));
        assert_eq!(fights[0].bout_order, 1);
    }
}
