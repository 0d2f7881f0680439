pub fn render_schema(vector_dim: u32) -> String {
	let init = include_str!("../../../sql/init.sql");
	let expanded = expand_includes(init);

	expanded.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		match line.trim().strip_prefix("\\ir ").map(str::trim) {
			Some("00_extensions.sql") => out.push_str(include_str!("../../../sql/00_extensions.sql")),
			Some("tables/001_memory_items.sql") =>
				out.push_str(include_str!("../../../sql/tables/001_memory_items.sql")),
			Some("tables/002_embedding_cache.sql") =>
				out.push_str(include_str!("../../../sql/tables/002_embedding_cache.sql")),
			_ => out.push_str(line),
		}

		out.push('\n');
	}

	out
}
