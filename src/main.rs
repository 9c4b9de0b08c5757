use csv_core::{ReadFieldResult, ReaderBuilder};
use fundep::{discover, Relation};
use std::io;
use std::str;

/// Reads a tab-separated table from `input`. The first record names the
/// columns; every later record is one row, with empty fields treated as
/// nulls.
fn load_relation<I: io::Read>(mut input: I) -> io::Result<Relation> {
    let mut inputbuf = [0; 16384];
    let mut fieldbuf = [0; 1024];
    let mut fieldlen = 0;
    let mut record: Vec<String> = Vec::new();
    let mut relation: Option<Relation> = None;
    let mut tsv = ReaderBuilder::new().delimiter(b'\t').build();

    loop {
        let read = input.read(&mut inputbuf)?;
        let mut bytes = &inputbuf[..read];
        loop {
            let (result, nin, nout) = tsv.read_field(bytes, &mut fieldbuf[fieldlen..]);
            bytes = &bytes[nin..];
            fieldlen += nout;
            match result {
                ReadFieldResult::InputEmpty => break,
                ReadFieldResult::OutputFull => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("field too long on line {}", tsv.line()),
                    ));
                }
                ReadFieldResult::Field { record_end } => {
                    let field = str::from_utf8(&fieldbuf[..fieldlen])
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    fieldlen = 0;
                    record.push(field.to_string());

                    if record_end {
                        match relation.as_mut() {
                            None => {
                                relation = Some(Relation::new(record.drain(..).collect()));
                            }
                            Some(relation) => {
                                if record.len() != relation.num_attributes() {
                                    return Err(io::Error::new(
                                        io::ErrorKind::InvalidData,
                                        format!(
                                            "row with {} fields in a {}-column table on line {}",
                                            record.len(),
                                            relation.num_attributes(),
                                            tsv.line()
                                        ),
                                    ));
                                }
                                let cells: Vec<&str> =
                                    record.iter().map(String::as_str).collect();
                                relation.push_row(&cells);
                                record.clear();
                            }
                        }
                    }
                }
                ReadFieldResult::End => {
                    return relation.ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "input has no header record")
                    });
                }
            }
        }
    }
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let threads = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1);

    let relation = load_relation(io::stdin().lock())?;
    let fds = discover(&relation, true, threads)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    println!(
        "{} rows, {} columns, {} minimal functional dependencies",
        relation.num_rows(),
        relation.num_attributes(),
        fds.len()
    );

    let names = relation.names();
    let mut lines: Vec<String> = fds
        .iter()
        .map(|fd| {
            let lhs: Vec<&str> = fd.lhs.iter().map(|a| names[a].as_str()).collect();
            format!("[{}] -> {}", lhs.join(", "), names[fd.rhs])
        })
        .collect();
    lines.sort();
    for line in &lines {
        println!("{}", line);
    }

    Ok(())
}
