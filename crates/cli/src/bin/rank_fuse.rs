use anyhow::Result;

fn main() -> Result<()> {
    fusion_cli::main_entry()
}
