fn main() -> anyhow::Result<()> {
    bookmark_ranker::cli::run()
}
