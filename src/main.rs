//! Interactive analyzer for C declaration specifiers.
//!
//! Reads one declaration per line from standard input, resolves and
//! canonicalizes it, and records the distinct `(kind, qualifiers)` tuples
//! seen so far. Per-line scratch memory comes from a region allocator
//! that is reset between iterations.

use std::io::{self, BufRead, Write};
use std::process;

use cdecl::alloc::PANIC_HEAP;
use cdecl::{Arena, CType, Lexer, Parser, StringBuilder, TypeTable};

fn main() {
  let arena = match Arena::new() {
    Ok(arena) => arena,
    Err(_) => process::exit(1),
  };
  let mut table = match TypeTable::new(&PANIC_HEAP) {
    Ok(table) => table,
    Err(_) => process::exit(1),
  };

  if run_interactive(&arena, &mut table).is_err() {
    process::exit(1);
  }
}

fn run_interactive(arena: &Arena, table: &mut TypeTable<'_>) -> io::Result<()> {
  let stdin = io::stdin();
  let stdout = io::stdout();
  let mut line = String::new();

  loop {
    {
      let mut out = stdout.lock();
      out.write_all(b">>> ")?;
      out.flush()?;
    }

    line.clear();
    if stdin.lock().read_line(&mut line)? == 0 {
      println!();
      return Ok(());
    }
    let input = line.trim_end_matches(|ch| ch == '\r' || ch == '\n');

    let mut lexer = Lexer::new(input.as_bytes());
    let mut parser = Parser::new();

    println!("=== TOKENS ===");
    match parser.parse(&mut lexer) {
      Ok(()) => report(arena, table, &parser),
      Err(error) => println!("[ERROR]: {}", error),
    }
    println!("==============\n");

    let usage = arena.usage();
    println!("=== ARENA INFO ===");
    println!("Begin: {:p}", arena.begin_ptr());
    println!("End:   {:p}", arena.end_ptr());
    println!("Usage: {} bytes (out of {})", usage.used, usage.total);
    println!("==================\n");

    // Scratch memory from this iteration is no longer referenced.
    arena.free_all();
  }
}

fn report(arena: &Arena, table: &mut TypeTable<'_>, parser: &Parser) {
  let mut builder = StringBuilder::new(arena);
  let canonical = match parser.canonicalize(&mut builder) {
    Ok(canonical) => canonical,
    Err(error) => {
      println!("[ERROR]: {}", error);
      return;
    }
  };
  println!("Expr: {} = '{}'", parser.ctype().kind_name(), canonical);

  // Only basic types reach the table for now.
  let basic = match parser.ctype() {
    CType::Basic(basic) => *basic,
    _ => return,
  };

  if let Some(info) = table.get_basic_qual(basic.kind, parser.qualifiers()) {
    let info: *const _ = info;
    println!("Found info @ {:p}", info);
  } else {
    println!("First time seeing info. Adding...");
    match table.add_basic_qual(basic.kind, parser.qualifiers()) {
      Ok(info) => {
        let info: *const _ = info;
        println!("Found info @ {:p}", info);
      }
      Err(_) => println!("Could not add info!"),
    }
  }
}
