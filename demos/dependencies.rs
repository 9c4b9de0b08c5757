use fundep::{discover, AttributeSet, Relation};
use std::fmt;

fn fmt_columns<W: fmt::Write>(out: &mut W, names: &[String], set: &AttributeSet) -> fmt::Result {
    let mut iter = set.iter();
    if let Some(column) = iter.next() {
        out.write_str(&names[column])?;
    }
    for column in iter {
        out.write_str(",")?;
        out.write_str(&names[column])?;
    }
    Ok(())
}

fn main() -> fmt::Result {
    let relation = Relation::from_rows(
        vec!["first", "last", "phone", "town", "zip"],
        &[
            &["Max", "Payne", "1970", "Paynesville", "77777"],
            &["Eve", "Smith", "7833", "Dryden", "98776"],
            &["Eve", "Payne", "1970", "Paynesville", "77777"],
            &["Max", "Smith", "3021", "Dryden", "98776"],
            &["Ian", "Payne", "1970", "Paynesville", "77777"],
            &["Ian", "Smith", "7833", "Dryden", "98776"],
        ],
    );
    let fds = discover(&relation, true, 1).expect("the example table is non-empty");
    let names = relation.names();

    let mut edges = 0;
    println!("digraph {{ rankdir=LR; node [shape=plaintext];");
    for fd in &fds {
        let mut lhs = String::new();
        if fd.lhs.is_empty() {
            lhs.push_str("{}");
        } else {
            fmt_columns(&mut lhs, names, &fd.lhs)?;
        }
        edges += 1;
        println!("\"{}\" -> \"{}\";", lhs, names[fd.rhs]);
    }
    println!("}} // {} dependencies", edges);

    Ok(())
}
