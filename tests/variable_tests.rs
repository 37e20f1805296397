use webctl::error::VariableError;
use webctl::variables::{register_builtins, Access, Kind, Value, Variables};

fn registry() -> Variables {
    let vars = Variables::new();
    register_builtins(&vars, "main", 4242, "");
    vars
}

#[test]
fn test_builtin_defaults() {
    let vars = registry();
    assert_eq!(vars.get("NAME").as_deref(), Some("main"));
    assert_eq!(vars.get("PID").as_deref(), Some("4242"));
    assert_eq!(vars.kind("zoom_level"), Some(Kind::Float));
    assert_eq!(vars.kind("verbose"), Some(Kind::Int));
    assert_eq!(vars.kind("uri"), Some(Kind::Str));
}

#[test]
fn test_read_only_slots_reject_writes() {
    let vars = registry();
    assert_eq!(
        vars.set("NAME", "other"),
        Err(VariableError::ReadOnly("NAME".into()))
    );
    assert_eq!(vars.get("NAME").as_deref(), Some("main"));
}

#[test]
fn test_new_variable_names_are_checked() {
    let vars = registry();
    assert!(vars.set("my.var_2", "x").is_ok());
    assert!(matches!(vars.set("2fast", "x"), Err(VariableError::InvalidName(_))));
    assert!(matches!(vars.set("has space", "x"), Err(VariableError::InvalidName(_))));
    assert!(matches!(vars.set("", "x"), Err(VariableError::InvalidName(_))));
}

#[test]
fn test_typed_parsing_takes_numeric_prefix() {
    let vars = registry();
    vars.set("verbose", "12abc").unwrap();
    assert_eq!(vars.value("verbose"), Some(Value::Int(12)));
    vars.set("verbose", "nope").unwrap();
    assert_eq!(vars.value("verbose"), Some(Value::Int(0)));
    vars.set("zoom_level", "1.5x").unwrap();
    assert_eq!(vars.value("zoom_level"), Some(Value::Float(1.5)));
}

#[test]
fn test_toggle_int_and_ring() {
    let vars = registry();
    vars.toggle("verbose", &[]).unwrap();
    assert_eq!(vars.get("verbose").as_deref(), Some("1"));
    vars.toggle("verbose", &[]).unwrap();
    assert_eq!(vars.get("verbose").as_deref(), Some("0"));

    let ring = vec!["red".to_string(), "green".to_string(), "blue".to_string()];
    vars.set("color", "green").unwrap();
    vars.toggle("color", &ring).unwrap();
    assert_eq!(vars.get("color").as_deref(), Some("blue"));
    vars.toggle("color", &ring).unwrap();
    assert_eq!(vars.get("color").as_deref(), Some("red"));

    vars.set("color", "purple").unwrap();
    vars.toggle("color", &ring).unwrap();
    assert_eq!(vars.get("color").as_deref(), Some("red"));
}

#[test]
fn test_dump_marks_read_only() {
    let vars = Variables::new();
    vars.register("a", Value::Str("x".into()), Access::READ_WRITE, None);
    vars.register("B", Value::Int(3), Access::READ_ONLY, None);
    vars.register("hidden", Value::Int(0), Access::HIDDEN, None);

    let lines: Vec<String> = vars.dump().iter().map(|e| e.line()).collect();
    assert_eq!(lines, vec!["set a = x", "# set B = 3"]);
}
