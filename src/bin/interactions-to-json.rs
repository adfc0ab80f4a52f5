use std::io::Read;

use interactions::EntityDecl;

fn main() {
    let mut buf = vec![];
    std::io::stdin()
        .read_to_end(&mut buf)
        .expect("could not read declarations on stdin");
    let buf = String::from_utf8(buf).expect("declarations should be UTF8");
    let decls = match EntityDecl::parse_all(&buf) {
        Ok(decls) => decls,
        Err(err) => {
            eprintln!("invalid declaration: {err}");
            std::process::exit(1);
        }
    };
    for decl in decls {
        match serde_json::to_string(&decl) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("could not serialize {}: {err}", decl.name);
                std::process::exit(1);
            }
        }
    }
}
