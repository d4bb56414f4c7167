//! Score statements: `i` events, `f` tables and `e`.

use crate::orchestra::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreStatement {
    /// p-fields of an `i` statement, carried values already resolved.
    Note(Vec<f64>),
    /// `f number time size gen args...`; `f 0 time` keeps the performance alive until `time`.
    Table {
        number: i32,
        time: f64,
        size: usize,
        gen: i32,
        args: Vec<f64>,
    },
    End(Option<f64>),
}

pub fn parse_score(text: &str) -> Result<Vec<ScoreStatement>, SyntaxError> {
    let mut statements = Vec::new();
    let mut previous: Option<Vec<f64>> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = index as i32 + 1;
        let code = raw.split(';').next().unwrap_or_default().trim();
        let mut chars = code.chars();
        let Some(kind) = chars.next() else {
            continue;
        };
        let fields: Vec<&str> = chars.as_str().split_whitespace().collect();
        match kind {
            'i' => {
                let pfields = note_fields(&fields, previous.as_deref(), line)?;
                previous = Some(pfields.clone());
                statements.push(ScoreStatement::Note(pfields));
            }
            'f' => statements.push(table(&numbers(&fields, line)?, line)?),
            'e' => statements.push(ScoreStatement::End(numbers(&fields, line)?.first().copied())),
            's' | 't' => log::debug!("Ignoring score statement `{}` on line {}.", kind, line),
            other => {
                return Err(SyntaxError::new(line, format!("unknown score statement `{other}`")))
            }
        }
    }
    Ok(statements)
}

fn numbers(fields: &[&str], line: i32) -> Result<Vec<f64>, SyntaxError> {
    fields
        .iter()
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|_| SyntaxError::new(line, format!("invalid number `{field}`")))
        })
        .collect()
}

/// Resolves `.` (repeat) and `+` (start after the previous note) against the previous note.
fn note_fields(
    fields: &[&str],
    previous: Option<&[f64]>,
    line: i32,
) -> Result<Vec<f64>, SyntaxError> {
    let mut pfields = Vec::with_capacity(fields.len());
    for (index, field) in fields.iter().enumerate() {
        let carried = previous.and_then(|previous| previous.get(index)).copied();
        let value = match *field {
            "." => carried.ok_or_else(|| SyntaxError::new(line, "nothing to carry"))?,
            "+" if index == 1 => match previous {
                Some([_, start, duration, ..]) => start + duration.abs(),
                _ => return Err(SyntaxError::new(line, "`+` without a previous note")),
            },
            _ => field
                .parse()
                .map_err(|_| SyntaxError::new(line, format!("invalid p-field `{field}`")))?,
        };
        pfields.push(value);
    }
    if pfields.len() < 3 {
        return Err(SyntaxError::new(line, "an i statement needs p1, p2 and p3"));
    }
    Ok(pfields)
}

fn table(fields: &[f64], line: i32) -> Result<ScoreStatement, SyntaxError> {
    match fields {
        [number, time, rest @ ..] if *number == 0.0 || !rest.is_empty() => {
            let (size, gen, args) = match rest {
                [size, gen, args @ ..] => (*size as usize, *gen as i32, args.to_vec()),
                _ => (0, 0, Vec::new()),
            };
            Ok(ScoreStatement::Table {
                number: *number as i32,
                time: *time,
                size,
                gen,
                args,
            })
        }
        _ => Err(SyntaxError::new(line, "an f statement needs a number, time, size and GEN")),
    }
}

/// Fills a function table. GEN10 sums harmonics, GEN2 copies values and GEN7 joins
/// straight-line segments; a negative GEN skips normalisation.
pub fn generate(size: usize, gen: i32, args: &[f64]) -> Option<Vec<f64>> {
    let mut data = match gen.abs() {
        10 => (0..size)
            .map(|i| {
                args.iter()
                    .enumerate()
                    .map(|(h, amp)| {
                        let phase = (h + 1) as f64 * i as f64 / size as f64;
                        amp * (std::f64::consts::TAU * phase).sin()
                    })
                    .sum()
            })
            .collect::<Vec<f64>>(),
        2 => {
            let mut data: Vec<f64> = args.iter().copied().take(size).collect();
            data.resize(size, 0.0);
            data
        }
        7 => segments(size, args),
        _ => return None,
    };
    if gen > 0 {
        let peak = data.iter().fold(0.0_f64, |peak, value| peak.max(value.abs()));
        if peak > 0.0 {
            data.iter_mut().for_each(|value| *value /= peak);
        }
    }
    Some(data)
}

fn segments(size: usize, args: &[f64]) -> Vec<f64> {
    let mut data = Vec::with_capacity(size);
    let mut value = args.first().copied().unwrap_or(0.0);
    for pair in args[args.len().min(1)..].chunks(2) {
        let [length, target] = pair else { break };
        let steps = (*length as usize).max(1);
        for step in 0..steps {
            data.push(value + (target - value) * step as f64 / steps as f64);
        }
        value = *target;
    }
    data.resize(size, value);
    data.truncate(size);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_and_chains_notes() {
        let score = parse_score("i 1 0 0.5 440\ni . + . 880\ni 2 . 1 .\n").unwrap();
        assert_eq!(
            score,
            [
                ScoreStatement::Note(vec![1.0, 0.0, 0.5, 440.0]),
                ScoreStatement::Note(vec![1.0, 0.5, 0.5, 880.0]),
                ScoreStatement::Note(vec![2.0, 0.5, 1.0, 880.0]),
            ]
        );
    }

    #[test]
    fn tables_holds_and_end() {
        let score = parse_score("f 1 0 8 10 1\nf 0 3600\ne 2 ; done\n").unwrap();
        assert!(matches!(score[0], ScoreStatement::Table { number: 1, size: 8, gen: 10, .. }));
        assert!(matches!(
            score[1],
            ScoreStatement::Table { number: 0, time, .. } if time == 3600.0
        ));
        assert_eq!(score[2], ScoreStatement::End(Some(2.0)));
    }

    #[test]
    fn rejects_malformed_statements() {
        assert_eq!(parse_score("i 1 0").unwrap_err().line, 1);
        assert!(parse_score("i . 0 1").is_err());
        assert!(parse_score("\nx 1 2 3").is_err());
        assert!(parse_score("f 1 0").is_err());
    }

    #[test]
    fn sine_table_is_normalised() {
        let table = generate(4, 10, &[0.5]).unwrap();
        assert!((table[1] - 1.0).abs() < 1e-12);
        assert!((table[3] + 1.0).abs() < 1e-12);
        assert!(generate(4, 99, &[]).is_none());
    }

    #[test]
    fn line_segments_fill_the_table() {
        assert_eq!(generate(5, -7, &[0.0, 4.0, 4.0]).unwrap(), [0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(generate(3, -2, &[1.0, 2.0, 3.0, 4.0]).unwrap(), [1.0, 2.0, 3.0]);
    }
}
