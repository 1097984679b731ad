fn main() {
    // option_env!() values are cached by cargo unless it knows to watch them.
    println!("cargo:rerun-if-env-changed=SUPABASE_URL");
    println!("cargo:rerun-if-env-changed=SUPABASE_PUBLISHABLE_KEY");
    println!("cargo:rerun-if-env-changed=INJURY_RESET_REDIRECT_URL");
}
