use anyhow::Result;

use hpcstack_lib::recipe::RecipeKind;

use crate::output::{print_json, print_stat};

pub fn cmd_recipes(json: bool) -> Result<()> {
  if json {
    let list: Vec<_> = RecipeKind::ALL
      .iter()
      .map(|kind| serde_json::json!({ "name": kind.name(), "description": kind.description() }))
      .collect();
    return print_json(&list);
  }

  for kind in RecipeKind::ALL {
    print_stat(kind.name(), kind.description());
  }
  Ok(())
}
