fn main() {
    slint_build::compile("ui/scanner.slint").expect("Slint UI compilation failed");
}
